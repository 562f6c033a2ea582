//! Runner end-to-end: a successful traced command produces a record.
//!
//! Lives in its own test binary because the runner moves the test process
//! into a fresh process group.

use std::fs;
use std::os::unix::fs::PermissionsExt;

use tapfs_core::OpClass;
use tapfs_proto::load_dir;
use tapfs_rpc::{run_traced, RunOptions};
use tapfs_tests::TestServer;

#[test]
fn test_successful_command_writes_record() {
    let server = TestServer::start().unwrap();
    let workdir = tempfile::tempdir().unwrap();

    // Seed the session the runner is about to open with operations, the
    // way filesystem callbacks would.
    let pgid = std::process::id() as i32;
    let session = server.registry.register(pgid);
    session.record("input.txt", OpClass::Read);
    session.record("output.bin", OpClass::Create);

    let outcome = run_traced(
        server.socket_path(),
        "true",
        workdir.path(),
        &RunOptions::default(),
    )
    .unwrap();
    assert_eq!(outcome.exit_code, 0);

    let record_path = outcome.record_path.expect("record should be written");
    assert_eq!(record_path, server.dep_dir().join(format!("{}.json", session.id())));
    let mode = fs::metadata(&record_path).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o644);

    let records = load_dir(server.dep_dir()).unwrap();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.id, session.id());
    assert_eq!(record.command, "true");
    assert_eq!(record.dir, workdir.path().display().to_string());
    assert_eq!(record.read, vec!["input.txt"]);
    assert_eq!(record.create, vec!["output.bin"]);
    assert!(record.update.is_empty());
    assert!(record.delete.is_empty());

    // The session is gone once the trace ended.
    assert!(server.registry.remove(pgid).is_err());
}
