//! Opt-in, local-only usage and crash recording.
//!
//! Events are appended as JSON lines under the tool's data directory. Nothing
//! leaves the machine; the sink exists so a provisioning run that went wrong
//! can be reconstructed after the terminal scrollback is gone. Disabled
//! unless `HWID_TELEMETRY` (usage) / `HWID_TELEMETRY_CRASH` (panics) are set.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use serde::Serialize;

const MAX_EVENT_BYTES: u64 = 1024 * 1024;

pub struct RunLog {
    app_version: String,
    run_id: String,
    usage_enabled: AtomicBool,
    crash_enabled: AtomicBool,
}

#[derive(Serialize)]
struct RunEvent {
    stage: String,
    at_unix_millis: i64,
    version: String,
    run_id: String,
    detail: BTreeMap<String, String>,
}

#[derive(Serialize)]
struct PanicRecord {
    at_unix_millis: i64,
    version: String,
    run_id: String,
    message: String,
    location: Option<String>,
}

static RUN_LOG: OnceLock<Arc<RunLog>> = OnceLock::new();

/// Initializes the global run log from the environment. Idempotent; later
/// calls return the already-installed instance.
pub fn init(app_version: &str) -> Arc<RunLog> {
    if let Some(existing) = RUN_LOG.get() {
        return Arc::clone(existing);
    }

    let log = Arc::new(RunLog {
        app_version: app_version.to_string(),
        run_id: new_run_id(),
        usage_enabled: AtomicBool::new(hwid_util::env_flag("HWID_TELEMETRY")),
        crash_enabled: AtomicBool::new(hwid_util::env_flag("HWID_TELEMETRY_CRASH")),
    });

    install_panic_hook(Arc::clone(&log));
    let _ = RUN_LOG.set(Arc::clone(&log));
    log
}

/// Records one run stage with key/value detail. No-op before `init` or when
/// usage recording is disabled.
pub fn stage(stage: &str, detail: &[(&str, &str)]) {
    if let Some(log) = RUN_LOG.get() {
        log.stage(stage, detail);
    }
}

impl RunLog {
    fn stage(&self, stage: &str, detail: &[(&str, &str)]) {
        if !self.usage_enabled.load(Ordering::Relaxed) {
            return;
        }
        let mut map = BTreeMap::new();
        for (key, value) in detail {
            if !key.trim().is_empty() {
                map.insert((*key).to_string(), (*value).to_string());
            }
        }
        let event = RunEvent {
            stage: stage.to_string(),
            at_unix_millis: hwid_util::now_millis(),
            version: self.app_version.clone(),
            run_id: self.run_id.clone(),
            detail: map,
        };
        append_event(&event);
    }

    fn panic_record(&self, message: String, location: Option<String>) {
        if !self.crash_enabled.load(Ordering::Relaxed) {
            return;
        }
        let record = PanicRecord {
            at_unix_millis: hwid_util::now_millis(),
            version: self.app_version.clone(),
            run_id: self.run_id.clone(),
            message,
            location,
        };
        write_panic_record(&record);
    }
}

fn install_panic_hook(log: Arc<RunLog>) {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let message = if let Some(msg) = info.payload().downcast_ref::<&str>() {
            (*msg).to_string()
        } else if let Some(msg) = info.payload().downcast_ref::<String>() {
            msg.clone()
        } else {
            "panic".to_string()
        };
        let location = info
            .location()
            .map(|loc| format!("{}:{}", loc.file(), loc.line()));
        log.panic_record(message, location);
        default_hook(info);
    }));
}

fn append_event(event: &RunEvent) {
    let dir = telemetry_dir();
    if fs::create_dir_all(&dir).is_err() {
        return;
    }
    let path = dir.join("runs.jsonl");
    if rotate_if_needed(&path).is_err() {
        return;
    }
    let Ok(mut file) = OpenOptions::new().create(true).append(true).open(&path) else {
        return;
    };
    if let Ok(line) = serde_json::to_string(event) {
        let _ = writeln!(file, "{line}");
    }
}

fn rotate_if_needed(path: &PathBuf) -> std::io::Result<()> {
    if let Ok(meta) = fs::metadata(path) {
        if meta.len() >= MAX_EVENT_BYTES {
            let rotated = path.with_extension("jsonl.1");
            let _ = fs::remove_file(&rotated);
            fs::rename(path, rotated)?;
        }
    }
    Ok(())
}

fn write_panic_record(record: &PanicRecord) {
    let dir = telemetry_dir().join("panics");
    if fs::create_dir_all(&dir).is_err() {
        return;
    }
    let path = dir.join(format!("panic-{}.json", record.at_unix_millis));
    if let Ok(file) = OpenOptions::new().create(true).write(true).open(&path) {
        let _ = serde_json::to_writer_pretty(file, record);
    }
}

fn telemetry_dir() -> PathBuf {
    hwid_util::data_dir().join("telemetry")
}

fn new_run_id() -> String {
    format!("{:x}-{:x}", hwid_util::now_millis(), std::process::id())
}
