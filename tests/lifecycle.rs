mod common;

use std::path::Path;

use common::{harness, write_instance, FakeSource};
use devsite_launcher::{ErrorKind, InstanceStatus};

#[tokio::test]
async fn start_stop_restart_report_reconciled_status() {
    let h = harness(FakeSource::nested_release());
    write_instance(&h.root, "demo-site");

    let stopped = h.launcher.stop("demo-site").await.unwrap();
    assert_eq!(stopped.status, InstanceStatus::Stopped);

    let started = h.launcher.start("demo-site").await.unwrap();
    assert_eq!(started.status, InstanceStatus::Running);

    let restarted = h.launcher.restart("demo-site").await.unwrap();
    assert_eq!(restarted.status, InstanceStatus::Running);

    assert_eq!(
        h.tool.commands_for("demo-site"),
        [
            "stop",
            "describe --json",
            "start",
            "describe --json",
            "restart",
            "describe --json",
        ]
    );
}

#[tokio::test]
async fn lifecycle_on_unknown_instance_is_not_found() {
    let h = harness(FakeSource::nested_release());

    let err = h.launcher.start("ghost").await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(h.tool.calls().is_empty());
}

#[tokio::test]
async fn tool_failure_keeps_its_kind() {
    let h = harness(FakeSource::nested_release());
    write_instance(&h.root, "demo-site");
    h.tool.fail_for("demo-site");

    let err = h.launcher.start("demo-site").await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::CommandFailed);
    assert_eq!(err.get("instance"), Some("demo-site"));
    assert_eq!(err.get("exit_code"), Some("1"));
}

#[tokio::test]
async fn delete_deregisters_and_removes_directory() {
    let h = harness(FakeSource::nested_release());
    let dir = write_instance(&h.root, "demo-site");

    h.launcher.delete("demo-site").await.unwrap();

    assert!(!dir.exists());
    assert_eq!(
        h.tool.commands_for("demo-site"),
        ["delete --omit-snapshot --yes"]
    );
    assert!(h.launcher.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn delete_of_missing_instance_is_not_found() {
    let h = harness(FakeSource::nested_release());

    let err = h.launcher.delete("ghost").await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn failed_deregistration_still_removes_directory() {
    let h = harness(FakeSource::nested_release());
    let dir = write_instance(&h.root, "demo-site");
    h.tool.fail_for("demo-site");

    let err = h.launcher.delete("demo-site").await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::PartialDeleteFailure);
    assert!(err.get("deregister").is_some());
    assert_eq!(err.get("disk"), None);
    assert!(!dir.exists());
}

#[tokio::test]
async fn database_transfer_passes_file_to_tool() {
    let h = harness(FakeSource::nested_release());
    write_instance(&h.root, "demo-site");

    h.launcher
        .import_db("demo-site", Path::new("/tmp/dump.sql.gz"))
        .await
        .unwrap();
    h.launcher
        .export_db("demo-site", Path::new("/tmp/out.sql.gz"))
        .await
        .unwrap();

    assert_eq!(
        h.tool.commands_for("demo-site"),
        [
            "import-db --file=/tmp/dump.sql.gz",
            "export-db --file=/tmp/out.sql.gz",
        ]
    );
}

#[tokio::test]
async fn tool_version_is_trimmed() {
    let h = harness(FakeSource::nested_release());

    assert_eq!(
        h.launcher.tool_version().await.unwrap(),
        "ddev version v1.24.1"
    );
}

#[tokio::test]
async fn relative_dump_path_is_resolved_from_caller_directory() {
    let h = harness(FakeSource::nested_release());
    write_instance(&h.root, "demo-site");

    h.launcher
        .import_db("demo-site", Path::new("dump.sql"))
        .await
        .unwrap();
    h.launcher
        .export_db("demo-site", Path::new("backups/out.sql.gz"))
        .await
        .unwrap();

    let cwd = std::env::current_dir().unwrap();
    assert_eq!(
        h.tool.commands_for("demo-site"),
        [
            format!("import-db --file={}", cwd.join("dump.sql").display()),
            format!("export-db --file={}", cwd.join("backups/out.sql.gz").display()),
        ]
    );
}

#[tokio::test]
async fn delete_refuses_instance_under_creation() {
    use fs2::FileExt;

    let h = harness(FakeSource::nested_release());
    let dir = write_instance(&h.root, "demo-site");
    let lock = std::fs::File::create(h.root.join(".demo-site.lock")).unwrap();
    FileExt::try_lock_exclusive(&lock).unwrap();

    let err = h.launcher.delete("demo-site").await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Busy);
    assert!(dir.exists());
    assert!(h.tool.calls().is_empty());

    drop(lock);
    h.launcher.delete("demo-site").await.unwrap();
    assert!(!dir.exists());
}
