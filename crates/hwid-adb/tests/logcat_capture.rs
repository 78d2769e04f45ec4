//! Exercises the capture lifecycle against a stand-in adb executable that
//! prints a few tagged lines and then hangs like the real logcat would.

#![cfg(unix)]

use std::{fs, os::unix::fs::PermissionsExt, time::Duration};

use hwid_adb::{logcat::LogcatCapture, Adb};

fn write_fake_adb(dir: &std::path::Path, body: &str) {
    let path = dir.join("adb");
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
}

#[tokio::test]
async fn buffer_holds_everything_written_before_stop() {
    let dir = tempfile::tempdir().unwrap();
    write_fake_adb(
        dir.path(),
        "echo 'D/CenterId: id2 = 42'\necho 'D/CenterId: id1 = SERIAL'\nsleep 60",
    );

    let adb = Adb::new(Some(dir.path()));
    let capture = LogcatCapture::start(&adb, "CenterId").unwrap();

    // Give the child time to emit its lines before the forceful kill.
    tokio::time::sleep(Duration::from_millis(300)).await;

    let buffer = capture.stop().await.unwrap();
    assert!(buffer.contains("id2 = 42"));
    assert!(buffer.contains("id1 = SERIAL"));
}

#[tokio::test]
async fn stop_tolerates_a_child_that_already_exited() {
    let dir = tempfile::tempdir().unwrap();
    write_fake_adb(dir.path(), "echo 'D/CenterId: id2 = 7'");

    let adb = Adb::new(Some(dir.path()));
    let capture = LogcatCapture::start(&adb, "CenterId").unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;

    let buffer = capture.stop().await.unwrap();
    assert!(buffer.contains("id2 = 7"));
}

#[tokio::test]
async fn missing_executable_reports_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let adb = Adb::new(Some(dir.path()));
    let err = LogcatCapture::start(&adb, "CenterId").unwrap_err();
    assert!(matches!(err, hwid_adb::BridgeError::NotFound));
}
