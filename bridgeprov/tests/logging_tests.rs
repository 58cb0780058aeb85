use bridgeprov::LogContext;
use std::fs;
use std::io::Write;
use std::path::Path;
use tracing_subscriber::fmt::MakeWriter;

fn log_files(dir: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect()
}

#[test]
fn nothing_is_created_before_the_first_event() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = LogContext::file_only(dir.path().join("logs"), "provisioning_log");

    assert_eq!(ctx.file_path(), None);
    assert!(!dir.path().join("logs").exists());
}

#[test]
fn first_event_creates_default_file() {
    let dir = tempfile::tempdir().unwrap();
    let default_dir = dir.path().join("logs");
    let ctx = LogContext::file_only(&default_dir, "provisioning_log");

    ctx.make_writer().write_all(b"device detected\n").unwrap();

    let path = ctx.file_path().unwrap();
    assert!(path.starts_with(&default_dir));
    let files = log_files(&default_dir);
    assert_eq!(files.len(), 1);
    assert!(files[0].starts_with("provisioning_log_"));
    assert_eq!(fs::read_to_string(path).unwrap(), "device detected\n");
}

#[test]
fn configuring_after_first_event_does_not_move_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let default_dir = dir.path().join("logs");
    let late_dir = dir.path().join("elsewhere");
    let ctx = LogContext::file_only(&default_dir, "provisioning_log");

    ctx.make_writer().write_all(b"first\n").unwrap();
    let before = ctx.file_path().unwrap();

    assert!(!ctx.configure_file(&late_dir, "station"));
    ctx.make_writer().write_all(b"second\n").unwrap();

    assert_eq!(ctx.file_path().unwrap(), before);
    assert!(!late_dir.exists());
    assert_eq!(fs::read_to_string(before).unwrap(), "first\nsecond\n");
}

#[test]
fn configured_file_is_used_instead_of_default() {
    let dir = tempfile::tempdir().unwrap();
    let default_dir = dir.path().join("logs");
    let chosen_dir = dir.path().join("station_logs");
    let ctx = LogContext::file_only(&default_dir, "provisioning_log");

    assert!(ctx.configure_file(&chosen_dir, "line3"));
    // named, not yet created
    assert!(!chosen_dir.exists());

    ctx.make_writer().write_all(b"hello\n").unwrap();

    assert!(!default_dir.exists());
    let files = log_files(&chosen_dir);
    assert_eq!(files.len(), 1);
    assert!(files[0].starts_with("line3_"));
}

#[test]
fn clones_share_one_file() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = LogContext::file_only(dir.path().join("logs"), "provisioning_log");
    let other = ctx.clone();

    ctx.make_writer().write_all(b"a\n").unwrap();
    other.make_writer().write_all(b"b\n").unwrap();

    assert_eq!(ctx.file_path(), other.file_path());
    assert_eq!(fs::read_to_string(ctx.file_path().unwrap()).unwrap(), "a\nb\n");
}

#[test]
fn tracing_events_reach_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = LogContext::file_only(dir.path().join("logs"), "provisioning_log");
    let subscriber = tracing_subscriber::fmt()
        .with_writer(ctx.clone())
        .with_ansi(false)
        .finish();

    tracing::subscriber::with_default(subscriber, || {
        let span = tracing::info_span!("session", port = "/dev/ttyUSB0");
        let _entered = span.enter();
        tracing::info!(state = "Identified", "transition");
    });

    let text = fs::read_to_string(ctx.file_path().unwrap()).unwrap();
    assert!(text.contains("transition"));
    assert!(text.contains("port=\"/dev/ttyUSB0\"") || text.contains("port=/dev/ttyUSB0"));
    assert!(text.contains("state=\"Identified\"") || text.contains("state=Identified"));
}
