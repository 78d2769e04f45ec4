//! CLI surface and resolved run configuration. Everything the driver touches
//! on disk or on the device is a named field here; nothing is a hardwired
//! global.

use std::{path::PathBuf, time::Duration};

use clap::Parser;

#[derive(Parser)]
#[command(
    name = "hwid-cli",
    version,
    about = "Provisions a hardware identity onto an Android build"
)]
pub struct Cli {
    /// Directory containing the adb executable (falls back to
    /// ANDROID_SDK_ROOT/platform-tools, then PATH)
    #[arg(long, env = "HWID_ADB_DIR")]
    pub adb_dir: Option<PathBuf>,

    /// Device registry file (default: <data dir>/devices.json)
    #[arg(long, env = "HWID_REGISTRY")]
    pub registry: Option<PathBuf>,

    /// Directory for per-device property-dump audit logs
    #[arg(long, env = "HWID_LOG_DIR", default_value = "_log")]
    pub log_dir: PathBuf,

    /// Android project to build
    #[arg(long, default_value = ".")]
    pub project_dir: PathBuf,

    /// Build descriptor to read the versionName from, relative to the
    /// project directory unless absolute
    #[arg(long, default_value = "app/build.gradle")]
    pub build_file: PathBuf,

    /// Directory where the release apk lands, relative to the project
    /// directory unless absolute
    #[arg(long, default_value = "app/build/outputs/apk")]
    pub apk_output_dir: PathBuf,

    /// Device-side directory the built apk is pushed to
    #[arg(long, default_value = "/sdcard/Download/")]
    pub device_apk_dir: String,

    /// Probe apk used for secondary-id detection
    #[arg(long, env = "HWID_PROBE_APK", default_value = "_id/center-id.apk")]
    pub probe_apk: PathBuf,

    /// Package name of the probe app
    #[arg(long, default_value = "ru.ros_diagnostics.centerid")]
    pub probe_package: String,

    /// Logcat tag the probe writes its identifiers under
    #[arg(long, default_value = "CenterId")]
    pub probe_tag: String,

    /// Product name used in the artifact file name
    #[arg(long, default_value = "Center")]
    pub product: String,

    /// Seconds to wait for the probe activity to report a visible start
    #[arg(long, default_value_t = 60)]
    pub launch_timeout: u64,
}

pub struct Config {
    pub adb_dir: Option<PathBuf>,
    pub registry_file: PathBuf,
    pub log_dir: PathBuf,
    pub project_dir: PathBuf,
    pub build_file: PathBuf,
    pub apk_output_dir: PathBuf,
    pub device_apk_dir: String,
    pub probe_apk: PathBuf,
    pub probe_package: String,
    pub probe_tag: String,
    pub product: String,
    pub launch_timeout: Duration,
}

impl Config {
    pub fn from_cli(cli: Cli) -> Self {
        // Project-relative paths follow the project, so a non-default
        // --project-dir reads the descriptor of (and finds the apk built by)
        // the project actually being built. Path::join keeps absolutes as
        // given.
        let build_file = cli.project_dir.join(cli.build_file);
        let apk_output_dir = cli.project_dir.join(cli.apk_output_dir);
        Self {
            adb_dir: cli.adb_dir,
            registry_file: cli
                .registry
                .unwrap_or_else(|| hwid_util::data_dir().join("devices.json")),
            log_dir: cli.log_dir,
            project_dir: cli.project_dir,
            build_file,
            apk_output_dir,
            device_apk_dir: cli.device_apk_dir,
            probe_apk: cli.probe_apk,
            probe_package: cli.probe_package,
            probe_tag: cli.probe_tag,
            product: cli.product,
            launch_timeout: Duration::from_secs(cli.launch_timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::path::Path;

    #[test]
    #[serial]
    fn defaults_resolve_to_the_original_layout() {
        let cli = Cli::parse_from(["hwid-cli"]);
        let config = Config::from_cli(cli);

        assert_eq!(config.log_dir, PathBuf::from("_log"));
        assert_eq!(config.build_file, Path::new(".").join("app/build.gradle"));
        assert_eq!(
            config.apk_output_dir,
            Path::new(".").join("app/build/outputs/apk")
        );
        assert_eq!(config.device_apk_dir, "/sdcard/Download/");
        assert_eq!(config.probe_package, "ru.ros_diagnostics.centerid");
        assert_eq!(config.probe_tag, "CenterId");
        assert_eq!(config.product, "Center");
        assert_eq!(config.launch_timeout, Duration::from_secs(60));
        assert!(config.registry_file.ends_with("devices.json"));
    }

    #[test]
    #[serial]
    fn flags_override_the_defaults() {
        let cli = Cli::parse_from([
            "hwid-cli",
            "--registry",
            "/tmp/other.json",
            "--product",
            "Kiosk",
            "--launch-timeout",
            "5",
        ]);
        let config = Config::from_cli(cli);

        assert_eq!(config.registry_file, PathBuf::from("/tmp/other.json"));
        assert_eq!(config.product, "Kiosk");
        assert_eq!(config.launch_timeout, Duration::from_secs(5));
    }

    #[test]
    #[serial]
    fn env_beats_default_and_a_flag_beats_env() {
        std::env::set_var("HWID_REGISTRY", "/tmp/env-registry.json");
        std::env::set_var("HWID_LOG_DIR", "/tmp/env-log");

        let config = Config::from_cli(Cli::parse_from(["hwid-cli"]));
        assert_eq!(config.registry_file, PathBuf::from("/tmp/env-registry.json"));
        assert_eq!(config.log_dir, PathBuf::from("/tmp/env-log"));

        let config = Config::from_cli(Cli::parse_from([
            "hwid-cli",
            "--registry",
            "/tmp/flag-registry.json",
            "--log-dir",
            "/tmp/flag-log",
        ]));
        assert_eq!(config.registry_file, PathBuf::from("/tmp/flag-registry.json"));
        assert_eq!(config.log_dir, PathBuf::from("/tmp/flag-log"));

        std::env::remove_var("HWID_REGISTRY");
        std::env::remove_var("HWID_LOG_DIR");
    }

    #[test]
    #[serial]
    fn project_relative_paths_follow_the_project_dir() {
        let config = Config::from_cli(Cli::parse_from([
            "hwid-cli",
            "--project-dir",
            "/work/center-app",
        ]));
        assert_eq!(
            config.build_file,
            PathBuf::from("/work/center-app/app/build.gradle")
        );
        assert_eq!(
            config.apk_output_dir,
            PathBuf::from("/work/center-app/app/build/outputs/apk")
        );

        let config = Config::from_cli(Cli::parse_from([
            "hwid-cli",
            "--project-dir",
            "/work/center-app",
            "--build-file",
            "/elsewhere/build.gradle",
        ]));
        assert_eq!(config.build_file, PathBuf::from("/elsewhere/build.gradle"));
    }
}
