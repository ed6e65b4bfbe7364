use std::collections::HashMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec::{Decoder, Encoder};
use crate::{Error, ErrorKind, Result};

/// A registered method: decodes its argument from raw bytes, runs the
/// handler, and returns the encoded reply.
pub type Handler = dyn Fn(&[u8]) -> Result<Vec<u8>> + Send + Sync;

/// An object with methods that can be called via RPC. A single
/// [`Server`](struct.Server.html) may host more than one Service.
///
/// Usually constructed by the `#[service]` attribute macro from a trait
/// definition; [`ServiceBuilder`](struct.ServiceBuilder.html) is the
/// underlying hand-written route.
#[derive(Clone)]
pub struct Service {
    core: Arc<ServiceCore>,
}

struct ServiceCore {
    name: String,
    methods: HashMap<String, Box<Handler>>,
}

impl Service {
    /// The name this service registers under; fully qualified method names
    /// are `"name.method"`.
    pub fn name(&self) -> &str {
        &self.core.name
    }

    /// Runs the named method against raw argument bytes. An unknown method
    /// is a configuration error, not a simulated network condition.
    pub fn dispatch(&self, method: &str, args: &[u8]) -> Result<Vec<u8>> {
        match self.core.methods.get(method) {
            Some(handler) => handler(args),
            None => {
                let mut choices: Vec<&str> =
                    self.core.methods.keys().map(String::as_str).collect();
                choices.sort_unstable();
                Err(Error::new(
                    ErrorKind::UnknownMethod,
                    format!(
                        "unknown method {} in service {}; expecting one of {:?}",
                        method,
                        self.core.name,
                        choices
                    ),
                ))
            }
        }
    }
}

/// Builds a [`Service`](struct.Service.html) from typed handler closures.
pub struct ServiceBuilder {
    name: String,
    methods: HashMap<String, Box<Handler>>,
}

impl ServiceBuilder {
    pub fn new(name: impl Into<String>) -> ServiceBuilder {
        ServiceBuilder {
            name: name.into(),
            methods: HashMap::new(),
        }
    }

    /// Registers `handler` under `method`. The wrapper closure owns the
    /// decode/encode shim: allocate a default argument, decode into it, run
    /// the handler against a default reply, encode the reply. Registering a
    /// method name twice keeps the later handler.
    pub fn add_handler<A, R, F>(&mut self, method: &str, handler: F) -> &mut ServiceBuilder
    where
        A: Serialize + DeserializeOwned + Default,
        R: Serialize + Default,
        F: Fn(A, &mut R) + Send + Sync + 'static,
    {
        self.methods.insert(
            method.to_string(),
            Box::new(move |raw: &[u8]| {
                let mut args = A::default();
                Decoder::new(raw).decode(&mut args)?;
                let mut reply = R::default();
                handler(args, &mut reply);
                let mut buf = Vec::new();
                Encoder::new(&mut buf).encode(&reply)?;
                Ok(buf)
            }),
        );
        self
    }

    pub fn build(self) -> Service {
        Service {
            core: Arc::new(ServiceCore {
                name: self.name,
                methods: self.methods,
            }),
        }
    }
}
