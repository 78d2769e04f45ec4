//! Probe-based secondary-identifier detection.
//!
//! Some device identifiers cannot be read from properties; a small probe app
//! is installed, launched once and force-stopped, and its diagnostic output
//! is captured concurrently. The identifier is then scraped out of the
//! captured text and the probe is uninstalled again.

use std::{path::PathBuf, time::Duration};

use async_trait::async_trait;
use regex::Regex;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{info, warn};

use hwid_adb::{logcat::LogcatCapture, Adb, BridgeError};
use hwid_util::extract::scan_captures;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("probe install failed: {0}")]
    Install(BridgeError),
    #[error("probe launch failed: {0}")]
    Launch(BridgeError),
    #[error("probe launch timed out after {0:?}")]
    Timeout(Duration),
    #[error("probe force-stop failed: {0}")]
    Stop(BridgeError),
    #[error("log capture failed: {0}")]
    Capture(BridgeError),
    #[error("probe uninstall failed: {0}")]
    Cleanup(BridgeError),
    #[error("identifier not detected")]
    NotDetected,
}

/// Everything the detector needs to know about the probe app.
pub struct ProbeConfig {
    pub apk: PathBuf,
    pub package: String,
    pub tag: String,
    pub launch_timeout: Duration,
    id_pattern: Regex,
}

impl ProbeConfig {
    pub fn new(
        apk: PathBuf,
        package: String,
        tag: String,
        launch_timeout: Duration,
    ) -> Result<Self, regex::Error> {
        let id_pattern = id_pattern_for_tag(&tag)?;
        Ok(Self {
            apk,
            package,
            tag,
            launch_timeout,
            id_pattern,
        })
    }
}

// The probe echoes two diagnostic lines: `id1 = <hardware serial>` for
// cross-validation and `id2 = <identifier>`. Only id2 lines are extracted.
fn id_pattern_for_tag(tag: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!(r".*{}.*: id2 = (.+)", regex::escape(tag)))
}

/// Pulls the identifier out of a capture buffer. The last matching id2 line
/// wins, and the capture is kept verbatim, whitespace included; the probe
/// controls its own formatting and the registry stores what it said. An
/// empty result means no line matched.
pub fn extract_probe_id(pattern: &Regex, text: &str) -> String {
    let mut id = String::new();
    scan_captures(text.as_bytes(), pattern, |caps| {
        id = caps[1].to_string();
    });
    id
}

/// The bridge operations the detection protocol needs. [`Adb`] is the real
/// implementation; tests substitute their own.
#[async_trait]
pub trait ProbeBridge: Send + Sync {
    async fn install_probe(&self, apk: &std::path::Path) -> Result<String, BridgeError>;
    async fn uninstall_probe(&self, package: &str) -> Result<String, BridgeError>;
    async fn launch_probe(&self, package: &str) -> Result<String, BridgeError>;
    async fn stop_probe(&self, package: &str) -> Result<String, BridgeError>;
    async fn begin_capture(&self, tag: &str) -> Result<Box<dyn ProbeCapture>, BridgeError>;
}

/// A running capture whose buffer becomes readable only once `finish` has
/// killed the underlying process and joined the reader.
#[async_trait]
pub trait ProbeCapture: Send {
    async fn finish(self: Box<Self>) -> Result<String, BridgeError>;
}

#[async_trait]
impl ProbeBridge for Adb {
    async fn install_probe(&self, apk: &std::path::Path) -> Result<String, BridgeError> {
        self.install(apk).await
    }

    async fn uninstall_probe(&self, package: &str) -> Result<String, BridgeError> {
        self.uninstall(package).await
    }

    async fn launch_probe(&self, package: &str) -> Result<String, BridgeError> {
        self.launch_main_activity(package).await
    }

    async fn stop_probe(&self, package: &str) -> Result<String, BridgeError> {
        self.force_stop(package).await
    }

    async fn begin_capture(&self, tag: &str) -> Result<Box<dyn ProbeCapture>, BridgeError> {
        let capture = LogcatCapture::start(self, tag)?;
        Ok(Box::new(capture))
    }
}

#[async_trait]
impl ProbeCapture for LogcatCapture {
    async fn finish(self: Box<Self>) -> Result<String, BridgeError> {
        self.stop().await
    }
}

/// Runs the full detection protocol: install the probe, capture its log
/// window, launch and force-stop it, tear the capture down and extract the
/// identifier. The probe is uninstalled afterwards no matter what happened;
/// the first failure stays authoritative and an uninstall failure is only
/// surfaced when everything before it succeeded.
pub async fn detect(bridge: &dyn ProbeBridge, config: &ProbeConfig) -> Result<String, ProbeError> {
    bridge
        .install_probe(&config.apk)
        .await
        .map_err(ProbeError::Install)?;

    let result = run_probe(bridge, config).await;

    let cleanup = bridge.uninstall_probe(&config.package).await;
    match (result, cleanup) {
        (Ok(id), Ok(_)) => {
            info!("probe identifier detected");
            Ok(id)
        }
        (Ok(_), Err(err)) => Err(ProbeError::Cleanup(err)),
        (Err(err), Ok(_)) => Err(err),
        (Err(err), Err(cleanup_err)) => {
            warn!("probe uninstall failed after an earlier error: {cleanup_err}");
            Err(err)
        }
    }
}

async fn run_probe(bridge: &dyn ProbeBridge, config: &ProbeConfig) -> Result<String, ProbeError> {
    // The capture must be live before the probe launches and must stay up
    // until after the force-stop, so the captured window fully brackets the
    // probe's active lifetime.
    let capture = bridge
        .begin_capture(&config.tag)
        .await
        .map_err(ProbeError::Capture)?;

    let outcome = match timeout(config.launch_timeout, bridge.launch_probe(&config.package)).await {
        Err(_) => Err(ProbeError::Timeout(config.launch_timeout)),
        Ok(Err(err)) => Err(ProbeError::Launch(err)),
        Ok(Ok(_)) => bridge
            .stop_probe(&config.package)
            .await
            .map(|_| ())
            .map_err(ProbeError::Stop),
    };

    // Torn down on every path, including timeout, so no orphan logcat child
    // outlives the run.
    let buffer = capture.finish().await;

    outcome?;
    let buffer = buffer.map_err(ProbeError::Capture)?;
    let id = extract_probe_id(&config.id_pattern, &buffer);
    if id.is_empty() {
        return Err(ProbeError::NotDetected);
    }
    Ok(id)
}
