use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use crossbeam_channel::{bounded, select, unbounded, Receiver, RecvTimeoutError, Sender};
use log::debug;
use parking_lot::Mutex;
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec::{Decoder, Encoder};
use crate::server::Server;

/// Name of a client endpoint; unique within a Network.
pub type EndName = String;
/// Name of a server slot in a Network's routing table.
pub type ServerName = String;

// Supervision poll period: how quickly an in-flight request notices that its
// endpoint was disabled or its server was replaced.
const LIVENESS_POLL: Duration = Duration::from_millis(100);

struct RequestMessage {
    end_name: EndName,
    fq_name: String, // e.g. "Raft.append_entries"
    args: Bytes,
    reply_tx: Sender<ResponseMessage>,
}

impl RequestMessage {
    // Sending can only fail once the caller has given up (network shutdown);
    // the reply is dropped on the floor in that case, like the real thing.
    fn reply(&self, resp: ResponseMessage) {
        let _ = self.reply_tx.send(resp);
    }
}

struct ResponseMessage {
    ok: bool,
    reply: Bytes,
}

impl ResponseMessage {
    fn success(reply: Bytes) -> ResponseMessage {
        ResponseMessage { ok: true, reply }
    }

    fn failure() -> ResponseMessage {
        ResponseMessage {
            ok: false,
            reply: Bytes::new(),
        }
    }
}

/// A named client handle through which calls are issued. Created by
/// [`Network::make_end`](struct.Network.html#method.make_end); cheap to
/// clone and safe to use from any thread.
#[derive(Clone)]
pub struct ClientEnd {
    end_name: EndName,
    // copy of the Network's shared request sender
    request_tx: Sender<RequestMessage>,
    // disconnects when the Network is cleaned up
    done_rx: Receiver<()>,
}

impl ClientEnd {
    pub fn name(&self) -> &str {
        &self.end_name
    }

    /// Sends an RPC and waits for the reply. Returns `true` iff a reply was
    /// received and decoded into `reply`; `false` covers every simulated
    /// failure (drop, timeout, dead server, disabled endpoint, shutdown), in
    /// which case the sink is left untouched.
    ///
    /// An argument that cannot be encoded, or a received reply that cannot
    /// be decoded, is a caller bug and panics.
    pub fn call<A, R>(&self, fq_name: &str, args: &A, reply: &mut R) -> bool
    where
        A: Serialize,
        R: Serialize + DeserializeOwned,
    {
        let mut buf = Vec::new();
        Encoder::new(&mut buf)
            .encode(args)
            .unwrap_or_else(|e| panic!("call({}): cannot encode arguments: {}", fq_name, e));

        let (reply_tx, reply_rx) = bounded(1);
        let req = RequestMessage {
            end_name: self.end_name.clone(),
            fq_name: fq_name.to_string(),
            args: Bytes::from(buf),
            reply_tx,
        };

        // publish the request, unless the network has been torn down
        select! {
            send(self.request_tx, req) -> res => {
                if res.is_err() {
                    return false;
                }
            },
            recv(self.done_rx) -> _ => return false,
        }

        // wait for the reply
        let resp = select! {
            recv(reply_rx) -> msg => match msg {
                Ok(resp) => resp,
                // the processing thread died without replying
                Err(_) => return false,
            },
            recv(self.done_rx) -> _ => return false,
        };

        if resp.ok {
            Decoder::new(resp.reply.as_ref())
                .decode(reply)
                .unwrap_or_else(|e| panic!("call({}): cannot decode reply: {}", fq_name, e));
            true
        } else {
            false
        }
    }
}

struct NetworkState {
    reliable: bool,
    // pause a long time before failing a call on a disabled connection
    long_delays: bool,
    // sometimes delay replies a long time
    long_reordering: bool,
    ends: HashMap<EndName, ClientEnd>,
    enabled: HashMap<EndName, bool>,
    // None marks a deleted server
    servers: HashMap<ServerName, Option<Server>>,
    // end name -> server name
    connections: HashMap<EndName, Option<ServerName>>,
}

// Routing snapshot taken once per request, under the state lock.
struct EndInfo {
    enabled: bool,
    server_name: Option<ServerName>,
    server: Option<Server>,
    reliable: bool,
    long_delays: bool,
    long_reordering: bool,
}

struct NetworkCore {
    state: Mutex<NetworkState>,
    request_tx: Sender<RequestMessage>,
    done_rx: Receiver<()>,
    // dropped exactly once, by cleanup(); every receiver then unblocks
    done_tx: Mutex<Option<Sender<()>>>,
    count: AtomicUsize,
    bytes: AtomicU64,
}

/// The central broker: owns the routing table, the per-endpoint on/off
/// switches, and the failure model. Cheap to clone.
#[derive(Clone)]
pub struct Network {
    core: Arc<NetworkCore>,
}

impl Default for Network {
    fn default() -> Network {
        Network::new()
    }
}

impl Network {
    /// Creates a network and starts its dispatcher thread. The dispatcher
    /// hands each incoming request to its own processing thread, so it is
    /// never stuck behind a slow handler.
    pub fn new() -> Network {
        let (request_tx, request_rx) = unbounded();
        let (done_tx, done_rx) = bounded(0);

        let core = Arc::new(NetworkCore {
            state: Mutex::new(NetworkState {
                reliable: true,
                long_delays: false,
                long_reordering: false,
                ends: HashMap::new(),
                enabled: HashMap::new(),
                servers: HashMap::new(),
                connections: HashMap::new(),
            }),
            request_tx,
            done_rx: done_rx.clone(),
            done_tx: Mutex::new(Some(done_tx)),
            count: AtomicUsize::new(0),
            bytes: AtomicU64::new(0),
        });

        let dispatcher = Arc::clone(&core);
        thread::spawn(move || loop {
            select! {
                recv(request_rx) -> msg => {
                    let req = match msg {
                        Ok(req) => req,
                        Err(_) => break,
                    };
                    dispatcher.count.fetch_add(1, Ordering::SeqCst);
                    dispatcher
                        .bytes
                        .fetch_add(req.args.len() as u64, Ordering::SeqCst);
                    let core = Arc::clone(&dispatcher);
                    thread::spawn(move || core.process_request(req));
                },
                recv(done_rx) -> _ => break,
            }
        });

        Network { core }
    }

    /// Tears the network down. The dispatcher exits and every blocked
    /// [`call`](struct.ClientEnd.html#method.call) unblocks with failure.
    pub fn cleanup(&self) {
        self.core.done_tx.lock().take();
    }

    /// Creates a client endpoint. Panics if the name is already in use.
    /// New endpoints start out disabled and unconnected.
    pub fn make_end(&self, end_name: impl Into<String>) -> ClientEnd {
        let end_name = end_name.into();
        let mut state = self.core.state.lock();

        if state.ends.contains_key(&end_name) {
            panic!("make_end: {:?} already exists", end_name);
        }

        let end = ClientEnd {
            end_name: end_name.clone(),
            request_tx: self.core.request_tx.clone(),
            done_rx: self.core.done_rx.clone(),
        };
        state.ends.insert(end_name.clone(), end.clone());
        state.enabled.insert(end_name.clone(), false);
        state.connections.insert(end_name, None);

        end
    }

    /// Registers or replaces the server under `server_name`. In-flight
    /// requests dispatched to a replaced instance fail rather than deliver.
    pub fn add_server(&self, server_name: impl Into<String>, server: Server) {
        let server_name = server_name.into();
        debug!("add_server {}", server_name);
        let mut state = self.core.state.lock();
        state.servers.insert(server_name, Some(server));
    }

    /// Marks the server as dead; pending and future calls to it fail.
    pub fn delete_server(&self, server_name: &str) {
        debug!("delete_server {}", server_name);
        let mut state = self.core.state.lock();
        state.servers.insert(server_name.to_string(), None);
    }

    /// Routes an endpoint to a server slot. An endpoint is expected to be
    /// connected once, right after creation; a second call silently rewires.
    pub fn connect(&self, end_name: &str, server_name: &str) {
        let mut state = self.core.state.lock();
        state
            .connections
            .insert(end_name.to_string(), Some(server_name.to_string()));
    }

    /// Turns an endpoint on or off. A disabled endpoint behaves as if its
    /// network link were cut: calls fail after a simulated timeout.
    pub fn enable(&self, end_name: &str, enabled: bool) {
        debug!(
            "end {} is {}",
            end_name,
            if enabled { "enabled" } else { "disabled" }
        );
        let mut state = self.core.state.lock();
        state.enabled.insert(end_name.to_string(), enabled);
    }

    /// Failure injection: when unreliable, requests and replies are each
    /// dropped with probability 0.1 and delivery picks up a little jitter.
    pub fn set_reliable(&self, yes: bool) {
        self.core.state.lock().reliable = yes;
    }

    /// When on, most replies are held back a fraction of a second to a few
    /// seconds, so they arrive well out of order.
    pub fn set_long_reordering(&self, yes: bool) {
        self.core.state.lock().long_reordering = yes;
    }

    /// When on, calls to unroutable endpoints take up to seven seconds to
    /// fail instead of up to a tenth of one.
    pub fn set_long_delays(&self, yes: bool) {
        self.core.state.lock().long_delays = yes;
    }

    /// Incoming-RPC count at one server; zero for an empty or deleted slot.
    pub fn count(&self, server_name: &str) -> usize {
        let state = self.core.state.lock();
        match state.servers.get(server_name) {
            Some(Some(server)) => server.count(),
            _ => 0,
        }
    }

    /// Total requests picked up by the dispatcher, routable or not.
    pub fn total_count(&self) -> usize {
        self.core.count.load(Ordering::SeqCst)
    }

    /// Total bytes carried: every request's argument bytes, plus the reply
    /// bytes of every reply actually delivered.
    pub fn total_bytes(&self) -> u64 {
        self.core.bytes.load(Ordering::SeqCst)
    }
}

impl NetworkCore {
    fn end_info(&self, end_name: &str) -> EndInfo {
        let state = self.state.lock();
        let server_name = state.connections.get(end_name).cloned().flatten();
        let server = server_name
            .as_ref()
            .and_then(|name| state.servers.get(name).cloned().flatten());
        EndInfo {
            enabled: state.enabled.get(end_name).copied().unwrap_or(false),
            server_name,
            server,
            reliable: state.reliable,
            long_delays: state.long_delays,
            long_reordering: state.long_reordering,
        }
    }

    // A request dispatched to `server` must not deliver its reply if the
    // endpoint has since been disabled, or the slot no longer holds that
    // same instance (replaced or deleted).
    fn server_dead(&self, end_name: &str, server_name: &str, server: &Server) -> bool {
        let state = self.state.lock();
        if !state.enabled.get(end_name).copied().unwrap_or(false) {
            return true;
        }
        match state.servers.get(server_name) {
            Some(Some(current)) => !Server::same(current, server),
            _ => true,
        }
    }

    fn process_request(&self, req: RequestMessage) {
        let info = self.end_info(&req.end_name);
        let mut rng = rand::thread_rng();

        let (server_name, server) = match (info.enabled, info.server_name, info.server) {
            (true, Some(name), Some(server)) => (name, server),
            _ => {
                // simulate no reply and an eventual timeout
                let ms = if info.long_delays {
                    rng.gen_range(0..7000u64)
                } else {
                    rng.gen_range(0..100u64)
                };
                debug!("{} -> {}: unroutable, failing after {}ms", req.end_name, req.fq_name, ms);
                thread::sleep(Duration::from_millis(ms));
                req.reply(ResponseMessage::failure());
                return;
            }
        };

        if !info.reliable {
            // short delay
            thread::sleep(Duration::from_millis(rng.gen_range(0..27u64)));

            if rng.gen_ratio(100, 1000) {
                // drop the request, return as if timeout
                debug!("{} -> {}: request dropped", req.end_name, req.fq_name);
                req.reply(ResponseMessage::failure());
                return;
            }
        }

        // Execute the request on its own thread so we can keep checking
        // whether the server has been killed and the RPC should fail. The
        // capacity-1 channel lets an abandoned handler finish and exit on
        // its own.
        let (result_tx, result_rx) = bounded(1);
        {
            let server = server.clone();
            let fq_name = req.fq_name.clone();
            let args = req.args.clone();
            thread::spawn(move || {
                let _ = result_tx.send(server.dispatch(&fq_name, &args));
            });
        }

        let mut result = None;
        loop {
            match result_rx.recv_timeout(LIVENESS_POLL) {
                Ok(r) => {
                    result = Some(r);
                    break;
                }
                Err(RecvTimeoutError::Timeout) => {
                    if self.server_dead(&req.end_name, &server_name, &server) {
                        debug!("{} -> {}: abandoned, server gone", req.end_name, req.fq_name);
                        break;
                    }
                }
                // the handler panicked; its panic is the user's to see, the
                // call just fails
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        let reply = match result {
            Some(Ok(reply)) => Bytes::from(reply),
            // a request for a service or method that does not exist is a
            // harness bug, not a simulated condition
            Some(Err(e)) => panic!("dispatch of {:?} failed: {}", req.fq_name, e),
            None => {
                req.reply(ResponseMessage::failure());
                return;
            }
        };

        // Do not reply if the server has been killed in the meantime, even
        // though the handler ran: the caller must not observe success from
        // an instance that no longer exists.
        if self.server_dead(&req.end_name, &server_name, &server) {
            req.reply(ResponseMessage::failure());
            return;
        }

        if !info.reliable && rng.gen_ratio(100, 1000) {
            // drop the reply, return as if timeout
            debug!("{} -> {}: reply dropped", req.end_name, req.fq_name);
            req.reply(ResponseMessage::failure());
            return;
        }

        if info.long_reordering && rng.gen_ratio(600, 900) {
            let upper = 1 + rng.gen_range(0..2000u64);
            let ms = 200 + rng.gen_range(0..upper);
            debug!("{} -> {}: reordering reply by {}ms", req.end_name, req.fq_name, ms);
            thread::sleep(Duration::from_millis(ms));
        }

        self.bytes.fetch_add(reply.len() as u64, Ordering::SeqCst);
        req.reply(ResponseMessage::success(reply));
    }
}
