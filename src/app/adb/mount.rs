use std::path::Path;
use std::time::Duration;

use tracing::info;

use crate::app::adb::runner::run_command_with_timeout;
use crate::app::error::AppError;

pub const MOUNT_DIR: &str = "/data/adb/fz";

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Root shell script that bind-mounts the patched APK over the stock install
/// and installs a boot script that repeats the mount.
pub fn build_mount_script(package_name: &str, apk_path: &Path) -> String {
    let pkg = shell_quote(package_name);
    let target = format!("{MOUNT_DIR}/{package_name}.apk");
    let target_q = shell_quote(&target);
    let boot_script = format!("/data/adb/service.d/mount_fz_{package_name}.sh");
    let boot_script_q = shell_quote(&boot_script);
    [
        format!("mkdir -p {MOUNT_DIR} /data/adb/service.d"),
        format!(
            "stock_path=$(pm path {pkg} | grep base | sed 's/package://g')"
        ),
        "[ -n \"$stock_path\" ] || { echo 'Stock app is not installed'; exit 1; }".to_string(),
        "grep -q \"$stock_path\" /proc/mounts && umount -l \"$stock_path\"".to_string(),
        format!("cp {} {target_q}", shell_quote(&apk_path.to_string_lossy())),
        format!("chmod 644 {target_q}"),
        format!("chown system:system {target_q}"),
        format!("chcon u:object_r:apk_data_file:s0 {target_q}"),
        format!("mount -o bind {target_q} \"$stock_path\""),
        format!(
            "printf '#!/system/bin/sh\\nwhile [ \"$(getprop sys.boot_completed)\" != 1 ]; do sleep 1; done\\nstock_path=$(pm path %s | grep base | sed s/package://g)\\n[ -n \"$stock_path\" ] && mount -o bind %s \"$stock_path\"\\n' {pkg} {target_q} > {boot_script_q}"
        ),
        format!("chmod 744 {boot_script_q}"),
        format!("am force-stop {pkg}"),
        "echo Mounted".to_string(),
    ]
    .join("\n")
}

pub fn mount_patched_apk(
    su_program: &str,
    package_name: &str,
    apk_path: &Path,
    timeout: Duration,
    trace_id: &str,
) -> Result<String, AppError> {
    if package_name.trim().is_empty() {
        return Err(AppError::validation("No app selected to mount", trace_id));
    }
    let script = build_mount_script(package_name, apk_path);
    let args = vec!["-c".to_string(), script];
    let output = run_command_with_timeout(su_program, &args, timeout, trace_id)?;
    info!(trace_id = %trace_id, package = %package_name, exit_code = ?output.exit_code, "mount");
    if !output.success() {
        return Err(AppError::system(
            format!("Mounting failed: {}", output.primary_text().trim()),
            trace_id,
        ));
    }
    Ok(output.stdout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn script_bind_mounts_over_stock_path() {
        let script = build_mount_script(
            "com.google.android.youtube",
            &PathBuf::from("/data/data/com.termux/files/home/patched/Patched-YouTube.apk"),
        );
        assert!(script.contains("pm path 'com.google.android.youtube'"));
        assert!(script.contains("mount -o bind '/data/adb/fz/com.google.android.youtube.apk'"));
        assert!(script.contains("cp '/data/data/com.termux/files/home/patched/Patched-YouTube.apk'"));
        assert!(script.contains("am force-stop 'com.google.android.youtube'"));
    }

    #[test]
    fn quotes_single_quotes() {
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn rejects_empty_package() {
        let err = mount_patched_apk("su", " ", &PathBuf::from("x.apk"), Duration::from_secs(1), "t")
            .expect_err("empty package");
        assert_eq!(err.code, crate::app::error::ERR_VALIDATION);
    }
}
