//! End-to-end provisioning flow: detect the device's identity, match or
//! register it, then build, tag and deploy the apk.

use std::{fs, path::Path};

use anyhow::{bail, Context, Result};
use tracing::info;

use hwid_adb::{props::extract_serials, Adb};
use hwid_probe::ProbeConfig;
use hwid_registry::{DeviceRecord, Registry};

use crate::{config::Config, gradle, prompt};

/// Build parameter key used instead of the property key when a probe-detected
/// secondary id identifies the device.
const SECONDARY_ID_BUILD_KEY: &str = "ANDROID_ID";

pub async fn run(config: Config) -> Result<()> {
    let adb = Adb::new(config.adb_dir.as_deref());

    println!("Reading device properties...");
    let props = adb
        .getprop_dump()
        .await
        .context("failed to read device properties")?;

    let serials = extract_serials(&props);
    if serials.is_empty() {
        bail!("no serial-bearing properties found on the device");
    }
    for (index, serial) in serials.iter().enumerate() {
        println!("{}. {}: {}", index + 1, serial.key, serial.value);
    }
    let Some(picked) = prompt::read_selection("Select suitable serial: ", serials.len())? else {
        println!("Empty or out-of-range selection, exiting.");
        return Ok(());
    };
    let selected = serials[picked].clone();

    let mode = prompt::read_line("Detect secondary id (Android 8+ only)? (a=auto, m=manual, n=no) ")?;
    let secondary_id = match mode.as_str() {
        "a" => {
            println!("Detecting secondary id...");
            let probe_config = ProbeConfig::new(
                config.probe_apk.clone(),
                config.probe_package.clone(),
                config.probe_tag.clone(),
                config.launch_timeout,
            )?;
            let id = hwid_probe::detect(&adb, &probe_config)
                .await
                .context("secondary-id detection failed")?;
            println!("Secondary id = {id}");
            id
        }
        "m" => prompt::read_line("Enter secondary id: ")?,
        _ => String::new(),
    };

    println!("Loading registry {}...", config.registry_file.display());
    let mut registry = Registry::load(&config.registry_file)?;

    let number = match registry.find_by_serial_value(&selected.value) {
        Some(existing) => {
            let answer = prompt::read_line(&format!(
                "Rebuild {} #{}? (y/n) ",
                config.product, existing.number
            ))?;
            if answer != "y" {
                println!("Not confirmed, exiting.");
                return Ok(());
            }
            hwid_telemetry::stage("device_matched", &[("number", &existing.number.to_string())]);
            existing.number
        }
        None => {
            let suggested = registry.next_suggested_number();
            let answer = prompt::read_line(&format!(
                "New {} #{}? (enter to accept, or type another number) ",
                config.product, suggested
            ))?;
            let number = prompt::parse_number_override(&answer, suggested);
            hwid_telemetry::stage("device_added", &[("number", &number.to_string())]);
            number
        }
    };

    let record = registry.upsert(number, selected, &secondary_id).clone();
    println!("Saving registry {}...", config.registry_file.display());
    registry.store(&config.registry_file)?;

    write_audit_log(&config.log_dir, record.number, &props)?;

    println!("Building apk...");
    let (key, value) = build_identity(&record);
    gradle::run_release_build(&config.project_dir, &key, &value).await?;

    let version = gradle::detect_version(&config.build_file)?;
    let apk_name = gradle::artifact_name(&config.product, record.number, &version);
    println!("Renaming app-release.apk to {apk_name}...");
    let apk_path = config.project_dir.join(&apk_name);
    gradle::rename_release_apk(&config.apk_output_dir, &apk_path)?;

    println!("Installing {apk_name} on the device...");
    adb.install(&apk_path).await.context("apk install failed")?;
    println!("Copying {apk_name} to {}...", config.device_apk_dir);
    adb.push(&apk_path, &config.device_apk_dir)
        .await
        .context("apk push failed")?;

    hwid_telemetry::stage(
        "run_completed",
        &[("number", &record.number.to_string()), ("version", &version)],
    );
    println!("Done: {} #{} provisioned.", config.product, record.number);
    Ok(())
}

/// Identity passed to the build: the selected serial pair, or the fixed
/// sentinel key with the secondary id when one was resolved.
fn build_identity(record: &DeviceRecord) -> (String, String) {
    if record.secondary_id.is_empty() {
        (record.serial.key.clone(), record.serial.value.clone())
    } else {
        (
            SECONDARY_ID_BUILD_KEY.to_string(),
            record.secondary_id.clone(),
        )
    }
}

/// Keeps one raw property dump per device number for later diagnosis. The
/// first dump ever taken for a number is the one that stays.
fn write_audit_log(log_dir: &Path, number: i64, props: &str) -> Result<()> {
    // File name kept as C<number>.txt for compatibility with existing logs.
    let path = log_dir.join(format!("C{number}.txt"));
    if path.exists() {
        info!("audit log {} already present, keeping it", path.display());
        return Ok(());
    }
    fs::create_dir_all(log_dir)
        .with_context(|| format!("failed to create log dir {}", log_dir.display()))?;
    fs::write(&path, props)
        .with_context(|| format!("failed to write audit log {}", path.display()))?;
    println!("Saved device properties to {}", path.display());
    Ok(())
}
