use simrpc::codec::{Decoder, Encoder};
use simrpc::{service, ErrorKind, Network, Server, ServiceBuilder};

fn echo_service() -> simrpc::Service {
    let mut builder = ServiceBuilder::new("Echo");
    builder.add_handler("echo", |args: String, reply: &mut String| {
        *reply = args;
    });
    builder.add_handler("len", |args: String, reply: &mut i64| {
        *reply = args.len() as i64;
    });
    builder.build()
}

fn encode<T: serde::Serialize>(value: &T) -> Vec<u8> {
    let mut buf = Vec::new();
    Encoder::new(&mut buf).encode(value).unwrap();
    buf
}

#[test]
fn direct_dispatch_round_trip() {
    let server = Server::new();
    server.add_service(echo_service());

    let raw = server
        .dispatch("Echo.echo", &encode(&"hi".to_string()))
        .unwrap();
    let mut reply = String::new();
    Decoder::new(raw.as_slice()).decode(&mut reply).unwrap();
    assert_eq!(reply, "hi");
    assert_eq!(server.count(), 1);
}

#[test]
fn unknown_method_lists_choices() {
    let server = Server::new();
    server.add_service(echo_service());

    let err = server.dispatch("Echo.bogus", &[]).unwrap_err();
    assert_eq!(err.kind, ErrorKind::UnknownMethod);
    let msg = err.to_string();
    assert!(msg.contains("echo") && msg.contains("len"), "got: {}", msg);
}

#[test]
fn unknown_service_lists_choices() {
    let server = Server::new();
    server.add_service(echo_service());

    let err = server.dispatch("Ghost.echo", &[]).unwrap_err();
    assert_eq!(err.kind, ErrorKind::UnknownService);
    assert!(err.to_string().contains("Echo"), "got: {}", err);
}

#[test]
fn malformed_method_name() {
    let server = Server::new();
    server.add_service(echo_service());

    let err = server.dispatch("no-dot-here", &[]).unwrap_err();
    assert_eq!(err.kind, ErrorKind::UnknownService);
}

#[test]
fn later_service_registration_wins() {
    let server = Server::new();
    server.add_service(echo_service());

    let mut builder = ServiceBuilder::new("Echo");
    builder.add_handler("echo", |args: String, reply: &mut String| {
        *reply = args.to_uppercase();
    });
    server.add_service(builder.build());

    let raw = server
        .dispatch("Echo.echo", &encode(&"hi".to_string()))
        .unwrap();
    let mut reply = String::new();
    Decoder::new(raw.as_slice()).decode(&mut reply).unwrap();
    assert_eq!(reply, "HI");
}

#[test]
fn garbage_arguments_error() {
    let server = Server::new();
    server.add_service(echo_service());

    let err = server.dispatch("Echo.echo", &[0xff; 2]).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Serialization);
}

#[test]
#[should_panic(expected = "already exists")]
fn duplicate_end_name_panics() {
    let net = Network::new();
    net.make_end("twin");
    net.make_end("twin");
}

#[service]
pub trait Mixed {
    fn bump(&self, args: i64, reply: &mut i64);
    // not a handler: has a return value, so it stays off the wire
    fn local_only(&self) -> i64;
}

struct MixedImpl;

impl Mixed for MixedImpl {
    fn bump(&self, args: i64, reply: &mut i64) {
        *reply = args + 1;
    }

    fn local_only(&self) -> i64 {
        0
    }
}

#[test]
fn non_handler_methods_are_not_exposed() {
    let server = Server::new();
    server.add_service(mixed_service(MixedImpl));

    let err = server.dispatch("Mixed.local_only", &[]).unwrap_err();
    assert_eq!(err.kind, ErrorKind::UnknownMethod);

    let raw = server.dispatch("Mixed.bump", &encode(&41i64)).unwrap();
    let mut reply = 0i64;
    Decoder::new(raw.as_slice()).decode(&mut reply).unwrap();
    assert_eq!(reply, 42);
}

#[test]
fn count_on_missing_or_deleted_slot_is_zero() {
    let net = Network::new();
    assert_eq!(net.count("nowhere"), 0);

    let server = Server::new();
    server.add_service(echo_service());
    net.add_server("srv", server);
    net.delete_server("srv");
    assert_eq!(net.count("srv"), 0);
    net.cleanup();
}
