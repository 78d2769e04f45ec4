//! Native build step: runs the project's gradle wrapper with the resolved
//! identity as build parameters, reads the versionName out of the build
//! descriptor and renames the produced apk.

use std::{
    fs,
    io::{self, BufRead},
    path::Path,
    process::Stdio,
    sync::LazyLock,
};

use anyhow::{bail, Context, Result};
use regex::Regex;
use tokio::process::Command;

use hwid_util::extract::scan_captures;

// `versionName '1.4'` or `versionName "1.4"`; a bare numeric literal is a
// versionCode-style line and intentionally does not match.
static VERSION_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\s*versionName\s*['"](.+)['"]"#).expect("version pattern"));

const RELEASE_APK: &str = "app-release.apk";

/// Runs `assembleRelease` with the identity passed through as `-PserialKey`
/// and `-PserialValue`. A nonzero exit is fatal and carries the full build
/// output for diagnosis.
pub async fn run_release_build(
    project_dir: &Path,
    serial_key: &str,
    serial_value: &str,
) -> Result<()> {
    let mut cmd = gradle_command(project_dir);
    cmd.arg(format!("-PserialKey={serial_key}"))
        .arg(format!("-PserialValue={serial_value}"))
        .arg("assembleRelease")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let output = cmd.output().await.context("failed to run gradle")?;
    if !output.status.success() {
        bail!(
            "gradle build failed with status {}:\n{}{}",
            output.status.code().unwrap_or(-1),
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
    }
    Ok(())
}

fn gradle_command(project_dir: &Path) -> Command {
    let wrapper = if cfg!(windows) {
        project_dir.join("gradlew.bat")
    } else {
        project_dir.join("gradlew")
    };
    let mut cmd = if wrapper.is_file() {
        if cfg!(windows) || is_executable(&wrapper) {
            Command::new(&wrapper)
        } else {
            let mut cmd = Command::new("sh");
            cmd.arg(&wrapper);
            cmd
        }
    } else {
        Command::new("gradle")
    };
    cmd.current_dir(project_dir);
    cmd
}

fn is_executable(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::metadata(path)
            .map(|meta| meta.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }
    #[cfg(not(unix))]
    {
        true
    }
}

/// Reads the apk version from the build descriptor. A descriptor without a
/// quoted versionName yields an empty version, not an error; a missing file
/// is an error.
pub fn detect_version(build_file: &Path) -> Result<String> {
    let file = fs::File::open(build_file)
        .with_context(|| format!("failed to open {}", build_file.display()))?;
    Ok(extract_version(io::BufReader::new(file)))
}

pub fn extract_version<R: BufRead>(reader: R) -> String {
    let mut version = String::new();
    scan_captures(reader, &VERSION_LINE, |caps| {
        version = caps[1].to_string();
    });
    version
}

pub fn artifact_name(product: &str, number: i64, version: &str) -> String {
    format!("{product}-{number}_{version}.apk")
}

/// Moves the freshly built release apk to its identity-tagged name.
pub fn rename_release_apk(apk_output_dir: &Path, target: &Path) -> Result<()> {
    let source = apk_output_dir.join(RELEASE_APK);
    fs::rename(&source, target).with_context(|| {
        format!(
            "failed to rename {} to {}",
            source.display(),
            target.display()
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_requires_a_quoted_literal() {
        let cases = [
            ("versionName '1'", "1"),
            ("versionName  '2'", "2"),
            (" versionName '3'", "3"),
            (" versionName  '4'", "4"),
            (" versionName  '5' ", "5"),
            ("versionName \"7\"", "7"),
            ("versionName  \"8\"", "8"),
            (" versionName \"9\"", "9"),
            (" versionName  \"10\"", "10"),
            (" versionName  \"11\" ", "11"),
            ("versionName 13", ""),
            ("", ""),
        ];
        for (input, expected) in cases {
            assert_eq!(extract_version(input.as_bytes()), expected, "input {input:?}");
        }
    }

    #[test]
    fn version_keeps_interior_content_untrimmed() {
        assert_eq!(extract_version("versionName ' 1.2 '".as_bytes()), " 1.2 ");
    }

    #[test]
    fn last_version_line_wins() {
        let text = "versionName '1.0'\nversionName '2.0'\n";
        assert_eq!(extract_version(text.as_bytes()), "2.0");
    }

    #[test]
    fn artifact_name_follows_the_convention() {
        assert_eq!(artifact_name("Center", 344, "1.4"), "Center-344_1.4.apk");
        assert_eq!(artifact_name("Kiosk", 400, ""), "Kiosk-400_.apk");
    }

    #[test]
    fn rename_moves_the_release_apk() {
        let dir = tempfile::tempdir().unwrap();
        let out_dir = dir.path().join("apk");
        fs::create_dir_all(&out_dir).unwrap();
        fs::write(out_dir.join(RELEASE_APK), b"apk bytes").unwrap();

        let target = dir.path().join("Center-344_1.4.apk");
        rename_release_apk(&out_dir, &target).unwrap();

        assert!(target.exists());
        assert!(!out_dir.join(RELEASE_APK).exists());
    }

    #[test]
    fn rename_fails_without_a_built_apk() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.apk");
        assert!(rename_release_apk(dir.path(), &target).is_err());
    }

    #[test]
    fn missing_build_file_is_an_error() {
        assert!(detect_version(Path::new("/nonexistent/build.gradle")).is_err());
    }
}
