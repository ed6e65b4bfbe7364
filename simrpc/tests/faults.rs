mod common;

use std::thread;
use std::time::{Duration, Instant};

use common::*;
use simrpc::{Network, Server};

fn slow_suit() -> (Network, SlowClient) {
    let net = Network::new();
    let server = Server::new();
    server.add_service(slow_service(SlowServer));
    net.add_server("srv", server);
    let client = SlowClient::new(net.make_end("c"));
    net.connect("c", "srv");
    net.enable("c", true);
    (net, client)
}

#[test]
fn disabled_end_fails_quickly() {
    init_logger();
    let (net, _server, _junk) = junk_suit();

    let client = JunkClient::new(net.make_end("off"));
    net.connect("off", "test-server");
    // never enabled

    let start = Instant::now();
    let mut reply = String::new();
    assert!(!client.int_to_string(&7, &mut reply));
    assert!(
        start.elapsed() < Duration::from_millis(400),
        "unroutable call took {:?}",
        start.elapsed()
    );
    assert_eq!(reply, "");
    assert_eq!(net.count("test-server"), 0);
    net.cleanup();
}

#[test]
fn disabled_then_enabled() {
    init_logger();
    let (net, _server, _junk) = junk_suit();

    let client = JunkClient::new(net.make_end("flip"));
    net.connect("flip", "test-server");

    let mut reply = String::new();
    assert!(!client.int_to_string(&7, &mut reply));
    assert_eq!(reply, "");

    net.enable("flip", true);
    assert!(client.int_to_string(&7, &mut reply));
    assert_eq!(reply, "7");
    net.cleanup();
}

#[test]
fn long_delays_stretch_unroutable_timeouts() {
    init_logger();
    let (net, _server, _junk) = junk_suit();
    net.set_long_delays(true);

    let client = JunkClient::new(net.make_end("way-off"));
    net.connect("way-off", "test-server");

    let start = Instant::now();
    let mut reply = String::new();
    assert!(!client.int_to_string(&7, &mut reply));
    assert!(
        start.elapsed() < Duration::from_millis(7500),
        "long-delay timeout took {:?}",
        start.elapsed()
    );
    net.cleanup();
}

// a server replaced mid-flight must fail the pending call promptly, and the
// replacement must serve new calls
#[test]
fn replacement_unsticks_pending_call() {
    init_logger();
    let (net, client) = slow_suit();

    let replacer = {
        let net = net.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            let fresh = Server::new();
            fresh.add_service(slow_service(SlowServer));
            net.add_server("srv", fresh);
            Instant::now()
        })
    };

    let mut reply = 0u64;
    let ok = client.nap(&500, &mut reply);
    let finished = Instant::now();
    let replaced_at = replacer.join().unwrap();

    assert!(!ok, "call must not survive a server replacement");
    assert_eq!(reply, 0);
    let lag = finished.saturating_duration_since(replaced_at);
    assert!(
        lag < Duration::from_millis(300),
        "pending call lingered {:?} past the replacement",
        lag
    );

    // the new instance is reachable
    let mut reply = 0u64;
    assert!(client.nap(&10, &mut reply));
    assert_eq!(reply, 10);
    net.cleanup();
}

#[test]
fn delete_server_unsticks_pending_call() {
    init_logger();
    let (net, client) = slow_suit();

    let deleter = {
        let net = net.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            net.delete_server("srv");
        })
    };

    let mut reply = 0u64;
    assert!(!client.nap(&500, &mut reply));
    deleter.join().unwrap();

    // the slot is dead now: further calls fail on the timeout path
    let start = Instant::now();
    assert!(!client.nap(&1, &mut reply));
    assert!(start.elapsed() < Duration::from_millis(400));
    assert_eq!(net.count("srv"), 0);
    net.cleanup();
}

#[test]
fn unreliable_drops_a_tenth_each_way() {
    init_logger();
    let (net, server, _junk) = junk_suit();
    net.set_reliable(false);

    let nclients = 50;
    let nrpcs = 20;
    let mut handles = Vec::new();
    for i in 0..nclients {
        let net = net.clone();
        handles.push(thread::spawn(move || {
            let end_name = format!("lossy-{}", i);
            let client = JunkClient::new(net.make_end(end_name.as_str()));
            net.connect(&end_name, "test-server");
            net.enable(&end_name, true);

            let mut ok = 0usize;
            for j in 0..nrpcs {
                let x = (i * 100 + j) as i64;
                let mut reply = String::new();
                if client.int_to_string(&x, &mut reply) {
                    assert_eq!(reply, x.to_string());
                    ok += 1;
                }
            }
            ok
        }));
    }

    let successes: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    // each direction survives with p = 0.9, so about 81% round-trip
    assert!(
        (750..=900).contains(&successes),
        "got {} successes out of {}",
        successes,
        nclients * nrpcs
    );
    assert!(server.count() >= successes);
    net.cleanup();
}

#[test]
fn long_reordering_delays_replies() {
    init_logger();
    let (net, _server, _junk) = junk_suit();
    net.set_long_reordering(true);

    let client = JunkClient::new(net.make_end("slowpoke"));
    net.connect("slowpoke", "test-server");
    net.enable("slowpoke", true);

    let mut slowest = Duration::from_millis(0);
    for i in 0..10i64 {
        let start = Instant::now();
        let mut reply = String::new();
        assert!(client.int_to_string(&i, &mut reply));
        assert_eq!(reply, i.to_string());
        slowest = slowest.max(start.elapsed());
    }
    // about two thirds of replies are held back by at least 200ms; the odds
    // of ten straight prompt deliveries are negligible
    assert!(
        slowest >= Duration::from_millis(200),
        "slowest reply took only {:?}",
        slowest
    );
    net.cleanup();
}

#[test]
fn cleanup_unblocks_pending_calls() {
    init_logger();
    let (net, client) = slow_suit();

    let start = Instant::now();
    let caller = {
        let client = client.clone();
        thread::spawn(move || {
            let mut reply = 0u64;
            client.nap(&3000, &mut reply)
        })
    };

    thread::sleep(Duration::from_millis(150));
    net.cleanup();

    assert!(!caller.join().unwrap());
    assert!(
        start.elapsed() < Duration::from_millis(2000),
        "cleanup left the call blocked for {:?}",
        start.elapsed()
    );

    // calls after cleanup fail immediately
    let mut reply = 0u64;
    assert!(!client.nap(&1, &mut reply));
}

// an RPC that is pending while the end is disabled must not delay RPCs
// issued after the end is re-enabled
#[test]
fn disabled_backlog_does_not_delay_later_calls() {
    init_logger();
    let (net, server, junk) = junk_suit();

    let client = JunkClient::new(net.make_end("laggy"));
    net.connect("laggy", "test-server");
    net.enable("laggy", false);

    let mut handles = Vec::new();
    for i in 0..20 {
        let client = client.clone();
        handles.push(thread::spawn(move || {
            let mut reply = String::new();
            // expected to fail: the end is disabled
            client.int_to_string(&i, &mut reply)
        }));
    }

    // long enough for every backlogged call to hit its unroutable timeout
    thread::sleep(Duration::from_millis(300));

    net.enable("laggy", true);
    let start = Instant::now();
    let mut reply = String::new();
    assert!(client.int_to_string(&99, &mut reply));
    assert_eq!(reply, "99");
    assert!(
        start.elapsed() < Duration::from_millis(100),
        "RPC took {:?} after enable",
        start.elapsed()
    );

    for h in handles {
        assert!(!h.join().unwrap());
    }

    assert_eq!(junk.log_int.lock().unwrap().len(), 1);
    assert_eq!(server.count(), 1);
    net.cleanup();
}
