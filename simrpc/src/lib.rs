//! Simulated RPC (simrpc) is an in-process RPC framework for
//! distributed-systems labs. It reproduces the adversarial conditions of a
//! real network — message loss, reordering, partitioning, server death and
//! long delays — entirely within one process, deterministically controllable
//! from test code, without ever opening a socket.
//!
//! A [`Network`](struct.Network.html) routes calls from named client
//! endpoints to named [`Server`](struct.Server.html)s. Each server hosts one
//! or more [`Service`](struct.Service.html)s, and each service maps method
//! names to handlers of the form `fn(args: A, reply: &mut R)`. Arguments and
//! replies travel as opaque encoded bytes through the
//! [`codec`](codec/index.html) module.
//!
//! # Examples
//! Services can be assembled by hand through a
//! [`ServiceBuilder`](struct.ServiceBuilder.html):
//! ```
//! use simrpc::{Network, Server, ServiceBuilder};
//!
//! let mut builder = ServiceBuilder::new("Echo");
//! builder.add_handler("upper", |args: String, reply: &mut String| {
//!     *reply = args.to_uppercase();
//! });
//! let server = Server::new();
//! server.add_service(builder.build());
//!
//! let net = Network::new();
//! net.add_server("server-0", server);
//! let end = net.make_end("client-0");
//! net.connect("client-0", "server-0");
//! net.enable("client-0", true);
//!
//! let mut reply = String::new();
//! assert!(end.call("Echo.upper", &"hi".to_string(), &mut reply));
//! assert_eq!(reply, "HI");
//! net.cleanup();
//! ```
//!
//! More commonly, the `service` attribute macro generates a typed client and
//! the service constructor from an ordinary trait definition:
//! ```ignore
//! #[simrpc::service]
//! pub trait Junk {
//!     fn int_to_string(&self, args: i64, reply: &mut String);
//! }
//! // generates `JunkClient` and `fn junk_service(impl Junk) -> Service`.
//! ```
//!
//! The simulated failure modes are controlled per network:
//! [`set_reliable`](struct.Network.html#method.set_reliable) injects drops
//! and jitter, [`set_long_delays`](struct.Network.html#method.set_long_delays)
//! stretches the timeout on unroutable calls, and
//! [`set_long_reordering`](struct.Network.html#method.set_long_reordering)
//! delays most replies long enough to arrive out of order. Killing a server
//! is modeled by [`delete_server`](struct.Network.html#method.delete_server)
//! or by registering a replacement under the same name; in-flight calls
//! against the old instance fail rather than deliver.

extern crate simrpc_macros;

// We would like to mark this #[doc(inline)] at the definition site, but that
// does not work properly on macros.
pub use simrpc_macros::service;

use std::fmt;

pub mod codec;
mod network;
mod server;
mod service;

pub use network::{ClientEnd, EndName, Network, ServerName};
pub use server::Server;
pub use service::{Service, ServiceBuilder};

pub type Result<T> = std::result::Result<T, Error>;

/// Framework error. Produced by the codec and by server-side dispatch;
/// simulated network failures are deliberately not errors — they surface as a
/// `false` return from [`ClientEnd::call`](struct.ClientEnd.html#method.call).
#[derive(Debug)]
pub struct Error {
    pub kind: ErrorKind,
    msg: String,
    cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// New error without a cause.
    pub fn new(kind: ErrorKind, msg: impl Into<String>) -> Self {
        Error {
            kind,
            msg: msg.into(),
            cause: None,
        }
    }

    /// New error with a cause.
    pub fn with_cause(
        kind: ErrorKind,
        msg: impl Into<String>,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Error {
            kind,
            msg: msg.into(),
            cause: Some(Box::new(cause)),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.cause {
            Some(ref e) => write!(f, "{} caused by:\n {}", self.msg, e),
            None => write!(f, "{}", self.msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self.cause {
            Some(ref e) => Some(e.as_ref()),
            None => None,
        }
    }
}

/// Types of [Error](struct.Error.html).
#[derive(Debug, PartialEq)]
pub enum ErrorKind {
    /// Encoding or decoding of an argument or reply value failed.
    Serialization,
    /// A request named a service not registered with the target server.
    UnknownService,
    /// A request named a method its service does not export.
    UnknownMethod,
}
