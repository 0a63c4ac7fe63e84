use std::path::Path;
use std::time::Duration;

use tracing::{info, warn};

use crate::app::adb::runner::run_adb;
use crate::app::error::AppError;
use crate::app::models::ApkInstallErrorCode;

/// Package id a non-root patched build is installed under, when it differs
/// from the stock package.
pub fn patched_package_id(stock_package: &str, is_rooted: bool) -> Option<&'static str> {
    if is_rooted {
        return None;
    }
    match stock_package {
        "com.google.android.youtube" => Some("app.fz.android.youtube"),
        "com.google.android.apps.youtube.music" => Some("app.fz.android.apps.youtube.music"),
        _ => None,
    }
}

pub fn uninstall_package(
    adb_program: &str,
    serial: &str,
    package_name: &str,
    timeout: Duration,
    trace_id: &str,
) -> Result<bool, AppError> {
    let args = vec![
        "-s".to_string(),
        serial.to_string(),
        "uninstall".to_string(),
        package_name.to_string(),
    ];
    let output = run_adb(adb_program, &args, timeout, trace_id)?;
    let success = output.stdout.contains("Success") || output.success();
    info!(trace_id = %trace_id, serial = %serial, package = %package_name, success, "uninstall");
    Ok(success)
}

pub fn install_apk(
    adb_program: &str,
    serial: &str,
    apk_path: &Path,
    timeout: Duration,
    trace_id: &str,
) -> Result<ApkInstallErrorCode, AppError> {
    if !apk_path.is_file() {
        return Err(AppError::validation(
            format!("APK not found: {}", apk_path.display()),
            trace_id,
        ));
    }
    let args = vec![
        "-s".to_string(),
        serial.to_string(),
        "install".to_string(),
        apk_path.to_string_lossy().to_string(),
    ];
    let output = run_adb(adb_program, &args, timeout, trace_id)?;
    let code = ApkInstallErrorCode::from_output(output.primary_text());
    info!(trace_id = %trace_id, serial = %serial, result = code.code(), "install");
    Ok(code)
}

/// Removes the conflicting install and installs `apk_path` again.
pub fn reinstall_patched(
    adb_program: &str,
    serial: &str,
    stock_package: &str,
    is_rooted: bool,
    apk_path: &Path,
    timeout: Duration,
    trace_id: &str,
) -> Result<ApkInstallErrorCode, AppError> {
    match patched_package_id(stock_package, is_rooted) {
        Some(package) => {
            if !uninstall_package(adb_program, serial, package, timeout, trace_id)? {
                warn!(trace_id = %trace_id, package = %package, "uninstall reported failure");
            }
        }
        None => {
            warn!(
                trace_id = %trace_id,
                package = %stock_package,
                "no patched package id known; installing without uninstall"
            );
        }
    }
    install_apk(adb_program, serial, apk_path, timeout, trace_id)
}
