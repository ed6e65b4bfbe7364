//! Fixtures shared by the integration tests: a junk service in the shape the
//! labs use, and a deliberately slow one for supervision scenarios.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use simrpc::{service, Network, Server};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct JunkArgs {
    pub x: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct JunkReply {
    pub x: String,
}

#[service]
pub trait Junk {
    fn int_to_string(&self, args: i64, reply: &mut String);
    fn string_to_int(&self, args: String, reply: &mut i64);
    fn with_struct(&self, args: JunkArgs, reply: &mut JunkReply);
}

#[derive(Clone, Default)]
pub struct JunkServer {
    pub log_int: Arc<Mutex<Vec<i64>>>,
    pub log_str: Arc<Mutex<Vec<String>>>,
}

impl Junk for JunkServer {
    fn int_to_string(&self, args: i64, reply: &mut String) {
        self.log_int.lock().unwrap().push(args);
        *reply = args.to_string();
    }

    fn string_to_int(&self, args: String, reply: &mut i64) {
        *reply = args.parse().unwrap_or(0);
        self.log_str.lock().unwrap().push(args);
    }

    fn with_struct(&self, args: JunkArgs, reply: &mut JunkReply) {
        reply.x = format!("x={}", args.x);
    }
}

/// A network with one junk server registered as "test-server".
pub fn junk_suit() -> (Network, Server, JunkServer) {
    let net = Network::new();
    let junk = JunkServer::default();
    let server = Server::new();
    server.add_service(junk_service(junk.clone()));
    net.add_server("test-server", server.clone());
    (net, server, junk)
}

#[service]
pub trait Slow {
    /// Sleeps for `args` milliseconds, then echoes them back.
    fn nap(&self, args: u64, reply: &mut u64);
}

pub struct SlowServer;

impl Slow for SlowServer {
    fn nap(&self, args: u64, reply: &mut u64) {
        thread::sleep(Duration::from_millis(args));
        *reply = args;
    }
}

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}
