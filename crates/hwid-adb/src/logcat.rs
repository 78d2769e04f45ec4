//! Long-running logcat capture.
//!
//! The probe protocol needs the diagnostic log read continuously while other
//! bridge calls run. The capture child is spawned before the probe launches
//! and torn down only after it is force-stopped, so the captured window fully
//! brackets the probe's active lifetime.

use std::process::Stdio;

use tokio::{
    io::{AsyncBufReadExt, BufReader},
    process::{Child, Command},
    task::JoinHandle,
};
use tracing::info;

use crate::{Adb, BridgeError};

/// A running `adb -d logcat -s <tag>:D` child plus the task that drains its
/// stdout. The reader task owns the capture buffer exclusively until
/// [`LogcatCapture::stop`] joins it, so the buffer is never read while still
/// being written.
#[derive(Debug)]
pub struct LogcatCapture {
    child: Child,
    collector: JoinHandle<String>,
}

impl LogcatCapture {
    /// Spawns the capture child filtered to `tag` at debug priority.
    pub fn start(adb: &Adb, tag: &str) -> Result<Self, BridgeError> {
        let filter = format!("{tag}:D");
        let mut cmd = Command::new(adb.program());
        cmd.arg("-d")
            .arg("logcat")
            .arg("-s")
            .arg(&filter)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        let mut child = cmd.spawn().map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                BridgeError::NotFound
            } else {
                BridgeError::Io(format!("failed to spawn logcat: {err}"))
            }
        })?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BridgeError::Io("logcat stdout not captured".into()))?;

        info!("logcat capture started (filter {filter})");
        let collector = tokio::spawn(async move {
            let mut buffer = String::new();
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                buffer.push_str(&line);
                buffer.push('\n');
            }
            buffer
        });

        Ok(Self { child, collector })
    }

    /// Kills the capture child, waits for it to exit and returns everything
    /// captured. logcat never terminates on its own and does not honor a
    /// cooperative interrupt on every host OS, so the kill is forceful and a
    /// kill-induced exit status is the expected termination signal, not an
    /// error.
    pub async fn stop(mut self) -> Result<String, BridgeError> {
        if let Err(err) = self.child.start_kill() {
            // Tolerate a child that already exited on its own.
            match self.child.try_wait() {
                Ok(Some(_)) => {}
                _ => return Err(BridgeError::Io(format!("failed to kill logcat: {err}"))),
            }
        }
        self.child
            .wait()
            .await
            .map_err(|err| BridgeError::Io(format!("failed to wait for logcat: {err}")))?;

        // Child is dead, so the reader task hits EOF and hands the buffer
        // over. Only after this join does anyone else see the text.
        self.collector
            .await
            .map_err(|err| BridgeError::Io(format!("logcat reader task failed: {err}")))
    }
}
