use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::service::Service;
use crate::{Error, ErrorKind, Result};

/// A server is a collection of services, all sharing the same RPC namespace,
/// so that e.g. both a Raft and a k/v service can listen on the same
/// simulated endpoint.
///
/// Cloning is cheap and shares the underlying state; the
/// [`Network`](struct.Network.html) uses that shared identity to tell a
/// replacement server apart from the instance an in-flight request was
/// dispatched to.
#[derive(Clone, Default)]
pub struct Server {
    core: Arc<ServerCore>,
}

#[derive(Default)]
struct ServerCore {
    inner: Mutex<ServerInner>,
}

#[derive(Default)]
struct ServerInner {
    services: HashMap<String, Service>,
    count: usize, // incoming RPCs
}

impl Server {
    pub fn new() -> Server {
        Server::default()
    }

    /// Registers a service under its own name; last registration wins.
    pub fn add_service(&self, svc: Service) {
        let mut inner = self.core.inner.lock();
        inner.services.insert(svc.name().to_string(), svc);
    }

    /// Number of RPCs this server has been asked to dispatch, including ones
    /// whose replies were later dropped or abandoned.
    pub fn count(&self) -> usize {
        self.core.inner.lock().count
    }

    /// Routes `"Service.method"` to the named service. Unknown services and
    /// malformed names are configuration errors.
    pub fn dispatch(&self, fq_name: &str, args: &[u8]) -> Result<Vec<u8>> {
        let (service_name, method) = match fq_name.rsplit_once('.') {
            Some(parts) => parts,
            None => {
                return Err(Error::new(
                    ErrorKind::UnknownService,
                    format!(
                        "malformed method name {:?}; expected \"Service.method\"",
                        fq_name
                    ),
                ))
            }
        };

        let service = {
            let mut inner = self.core.inner.lock();
            inner.count += 1;
            match inner.services.get(service_name) {
                Some(svc) => svc.clone(),
                None => {
                    let mut choices: Vec<String> = inner.services.keys().cloned().collect();
                    choices.sort_unstable();
                    return Err(Error::new(
                        ErrorKind::UnknownService,
                        format!(
                            "unknown service {} in {}.{}; expecting one of {:?}",
                            service_name, service_name, method, choices
                        ),
                    ));
                }
            }
        };

        service.dispatch(method, args)
    }

    pub(crate) fn same(a: &Server, b: &Server) -> bool {
        Arc::ptr_eq(&a.core, &b.core)
    }
}
