//! Socket-level behavior of the session RPC.

use tapfs_core::OpClass;
use tapfs_proto::Method;
use tapfs_rpc::RpcError;
use tapfs_tests::TestServer;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("tapfs_rpc=debug")
        .with_test_writer()
        .try_init();
}

#[test]
fn test_start_trace_idempotent_over_the_wire() {
    init_tracing();
    let server = TestServer::start().unwrap();
    let mut client = server.client().unwrap();

    client.call(Method::StartTrace, 7001).unwrap();
    client.call(Method::StartTrace, 7001).unwrap();

    // Still a single session: closing once succeeds, twice errors.
    client.call(Method::EndTrace, 7001).unwrap();
    let second = client.call(Method::EndTrace, 7001);
    assert!(matches!(second, Err(RpcError::Remote(_))));
}

#[test]
fn test_end_trace_of_unknown_pgid() {
    init_tracing();
    let server = TestServer::start().unwrap();
    let mut client = server.client().unwrap();

    match client.call(Method::EndTrace, 60606) {
        Err(RpcError::Remote(message)) => assert!(message.contains("60606")),
        other => panic!("expected remote error, got {other:?}"),
    }
}

#[test]
fn test_sessions_are_isolated_per_pgid() {
    init_tracing();
    let server = TestServer::start().unwrap();

    // Two wrappers, two connections, two disjoint sessions.
    let mut first = server.client().unwrap();
    let mut second = server.client().unwrap();
    first.call(Method::StartTrace, 7101).unwrap();
    second.call(Method::StartTrace, 7102).unwrap();

    server.registry.resolve(7101).record("a", OpClass::Read);
    server.registry.resolve(7102).record("b", OpClass::Read);

    let r1 = first.call(Method::EndTrace, 7101).unwrap();
    let r2 = second.call(Method::EndTrace, 7102).unwrap();
    assert_eq!(r1.read, vec!["a"]);
    assert_eq!(r2.read, vec!["b"]);
    assert_ne!(r1.id, r2.id);
}

#[test]
fn test_end_trace_reports_dep_dir() {
    init_tracing();
    let server = TestServer::start().unwrap();
    let mut client = server.client().unwrap();

    client.call(Method::StartTrace, 7201).unwrap();
    let response = client.call(Method::EndTrace, 7201).unwrap();
    assert_eq!(response.dep_dir, server.dep_dir().display().to_string());
}
