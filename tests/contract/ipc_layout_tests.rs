//! Shared IPC directory contract: layout, marker name, write discipline.

use nanoclaw_harness::ipc::{IpcDir, CLOSE_MARKER};

#[test]
fn close_marker_is_named_underscore_close_under_input() {
    assert_eq!(CLOSE_MARKER, "_close");
    let ipc = IpcDir::new("/srv/nanoclaw/data/ipc/family");
    assert_eq!(
        ipc.close_marker_path(),
        std::path::PathBuf::from("/srv/nanoclaw/data/ipc/family/input/_close")
    );
}

#[test]
fn ensure_layout_creates_the_input_subdirectory() {
    let dir = tempfile::tempdir().expect("tempdir");
    let ipc = IpcDir::new(dir.path().join("ipc"));
    ipc.ensure_layout().expect("layout");
    assert!(ipc.input_dir().is_dir());
}

#[test]
fn the_harness_never_touches_workload_files_in_the_shared_tree() {
    let dir = tempfile::tempdir().expect("tempdir");
    let ipc = IpcDir::new(dir.path());
    ipc.ensure_layout().expect("layout");

    // Files the workload may be reading or writing must survive both
    // layout preparation and marker delivery untouched.
    let workload_file = ipc.input_dir().join("pending-task.json");
    std::fs::write(&workload_file, r#"{"task":"keep me"}"#).expect("seed workload file");
    let root_file = ipc.root().join("output.log");
    std::fs::write(&root_file, "workload log").expect("seed root file");

    ipc.ensure_layout().expect("layout is idempotent");
    ipc.write_close_marker().expect("marker");

    assert_eq!(
        std::fs::read_to_string(&workload_file).expect("read back"),
        r#"{"task":"keep me"}"#
    );
    assert_eq!(std::fs::read_to_string(&root_file).expect("read back"), "workload log");
    assert_eq!(
        std::fs::metadata(ipc.close_marker_path()).expect("marker exists").len(),
        0,
        "the marker is zero-byte; its presence is the whole signal"
    );
}

#[test]
fn only_a_stale_close_marker_is_cleared_between_invocations() {
    let dir = tempfile::tempdir().expect("tempdir");
    let ipc = IpcDir::new(dir.path());
    ipc.ensure_layout().expect("layout");
    ipc.write_close_marker().expect("marker from a previous turn");
    let other = ipc.input_dir().join("note.txt");
    std::fs::write(&other, "keep").expect("seed");

    ipc.ensure_layout().expect("prepare next turn");
    assert!(!ipc.close_marker_path().exists(), "stale marker cleared");
    assert!(other.exists(), "everything else is left alone");
}
