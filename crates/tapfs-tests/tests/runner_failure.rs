//! Runner end-to-end: failed commands still close their session.
//!
//! The two sequences run inside one test function; they share the test
//! process's PGID and must not interleave.

use tapfs_proto::load_dir;
use tapfs_rpc::{run_traced, RunOptions};
use tapfs_tests::TestServer;

#[test]
fn test_failed_command_behavior() {
    let workdir = tempfile::tempdir().unwrap();

    // Default: the child's exit code comes back, no record is written, and
    // the session was still closed server-side.
    let server = TestServer::start().unwrap();
    let outcome = run_traced(
        server.socket_path(),
        "exit 7",
        workdir.path(),
        &RunOptions::default(),
    )
    .unwrap();
    assert_eq!(outcome.exit_code, 7);
    assert!(outcome.record_path.is_none());
    assert!(load_dir(server.dep_dir()).unwrap().is_empty());
    assert!(server
        .registry
        .remove(std::process::id() as i32)
        .is_err());

    // With keep_failed, the record survives under the distinct name.
    let server = TestServer::start().unwrap();
    let outcome = run_traced(
        server.socket_path(),
        "exit 3",
        workdir.path(),
        &RunOptions { keep_failed: true },
    )
    .unwrap();
    assert_eq!(outcome.exit_code, 3);
    let path = outcome.record_path.expect("forensic record expected");
    assert!(path
        .file_name()
        .unwrap()
        .to_string_lossy()
        .ends_with(".failed.json"));

    let records = load_dir(server.dep_dir()).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].command, "exit 3");
}
