//! Device-bridge layer: blocking adb invocations pinned to the single
//! attached USB device, plus the long-running logcat capture used by the
//! probe protocol.

use std::{
    io,
    path::{Path, PathBuf},
    process::Stdio,
};

use thiserror::Error;
use tokio::process::Command;

pub mod logcat;
pub mod props;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("adb not found (set HWID_ADB_DIR or ANDROID_SDK_ROOT)")]
    NotFound,
    #[error("adb failed: {0}")]
    Io(String),
    #[error("adb exited with status {status}:\n{output}")]
    Exit { status: i32, output: String },
}

/// Handle to the adb executable. Every request/response invocation carries
/// the `-d` flag so commands reach the one connected USB device and never an
/// emulator.
#[derive(Clone, Debug)]
pub struct Adb {
    program: PathBuf,
}

impl Adb {
    /// Resolves the adb executable. An explicit directory wins; otherwise
    /// `HWID_ADB_DIR`, `ADB_PATH`, the SDK layout under
    /// `ANDROID_SDK_ROOT`/`ANDROID_HOME`, and finally plain `adb` on PATH.
    pub fn new(adb_dir: Option<&Path>) -> Self {
        Self {
            program: resolve_program(adb_dir),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Runs one adb command to completion and returns the combined
    /// stdout/stderr text. A nonzero exit carries that same text so the
    /// operator can diagnose the device-side failure.
    pub async fn run(&self, args: &[&str]) -> Result<String, BridgeError> {
        if args.is_empty() {
            return Err(BridgeError::Io("empty argument list".into()));
        }
        let mut cmd = Command::new(&self.program);
        cmd.arg("-d")
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let output = cmd.output().await.map_err(|err| {
            if err.kind() == io::ErrorKind::NotFound {
                BridgeError::NotFound
            } else {
                BridgeError::Io(err.to_string())
            }
        })?;

        let combined = combine_output(&output.stdout, &output.stderr);
        if output.status.success() {
            Ok(combined)
        } else {
            Err(BridgeError::Exit {
                status: output.status.code().unwrap_or(-1),
                output: combined,
            })
        }
    }

    /// Dumps all system properties (`adb -d shell getprop`).
    pub async fn getprop_dump(&self) -> Result<String, BridgeError> {
        self.run(&["shell", "getprop"]).await
    }

    /// Installs an apk, replacing any existing install and granting runtime
    /// permissions (`install -rg`).
    pub async fn install(&self, apk: &Path) -> Result<String, BridgeError> {
        let apk = apk.to_string_lossy();
        self.run(&["install", "-rg", apk.as_ref()]).await
    }

    pub async fn uninstall(&self, package: &str) -> Result<String, BridgeError> {
        self.run(&["uninstall", package]).await
    }

    /// Launches a package's main activity and blocks until the device
    /// reports it visibly started (`am start -W`).
    pub async fn launch_main_activity(&self, package: &str) -> Result<String, BridgeError> {
        let component = format!("{package}/.MainActivity");
        self.run(&[
            "shell",
            "am",
            "start",
            "-W",
            "-a",
            "android.intent.action.MAIN",
            "-n",
            &component,
        ])
        .await
    }

    pub async fn force_stop(&self, package: &str) -> Result<String, BridgeError> {
        self.run(&["shell", "am", "force-stop", package]).await
    }

    pub async fn push(&self, local: &Path, device_dir: &str) -> Result<String, BridgeError> {
        let local = local.to_string_lossy();
        self.run(&["push", local.as_ref(), device_dir]).await
    }
}

fn resolve_program(adb_dir: Option<&Path>) -> PathBuf {
    if let Some(dir) = adb_dir {
        return dir.join(adb_binary_name());
    }
    if let Ok(dir) = std::env::var("HWID_ADB_DIR") {
        return hwid_util::expand_user(&dir).join(adb_binary_name());
    }
    if let Ok(path) = std::env::var("ADB_PATH") {
        return PathBuf::from(path);
    }
    if let Ok(sdk_root) =
        std::env::var("ANDROID_SDK_ROOT").or_else(|_| std::env::var("ANDROID_HOME"))
    {
        let candidate = PathBuf::from(&sdk_root)
            .join("platform-tools")
            .join(adb_binary_name());
        if candidate.exists() {
            return candidate;
        }
    }
    PathBuf::from(adb_binary_name())
}

fn adb_binary_name() -> &'static str {
    if cfg!(windows) {
        "adb.exe"
    } else {
        "adb"
    }
}

fn combine_output(stdout: &[u8], stderr: &[u8]) -> String {
    let stdout = String::from_utf8_lossy(stdout);
    let stderr = String::from_utf8_lossy(stderr);
    if stderr.trim().is_empty() {
        return stdout.into_owned();
    }
    if stdout.trim().is_empty() {
        return stderr.into_owned();
    }
    let mut combined = stdout.into_owned();
    if !combined.ends_with('\n') {
        combined.push('\n');
    }
    combined.push_str(&stderr);
    combined
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn explicit_dir_wins_over_environment() {
        std::env::set_var("HWID_ADB_DIR", "/tmp/ignored-platform-tools");
        let adb = Adb::new(Some(Path::new("/opt/platform-tools")));
        std::env::remove_var("HWID_ADB_DIR");

        assert_eq!(
            adb.program(),
            Path::new("/opt/platform-tools").join(adb_binary_name())
        );
    }

    #[test]
    #[serial]
    fn env_dir_is_used_when_no_explicit_dir_is_given() {
        std::env::set_var("HWID_ADB_DIR", "/tmp/env-platform-tools");
        let adb = Adb::new(None);
        std::env::remove_var("HWID_ADB_DIR");

        assert_eq!(
            adb.program(),
            Path::new("/tmp/env-platform-tools").join(adb_binary_name())
        );
    }

    #[test]
    fn combine_output_merges_both_streams() {
        assert_eq!(combine_output(b"out\n", b""), "out\n");
        assert_eq!(combine_output(b"", b"err\n"), "err\n");
        assert_eq!(combine_output(b"out", b"err\n"), "out\nerr\n");
    }

    #[tokio::test]
    async fn empty_argument_list_is_rejected() {
        let adb = Adb::new(Some(Path::new("/nonexistent")));
        let err = adb.run(&[]).await.unwrap_err();
        assert!(matches!(err, BridgeError::Io(_)));
    }
}
