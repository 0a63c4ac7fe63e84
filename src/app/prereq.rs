use std::fs::{self, File};
use std::path::{Path, PathBuf};

use tracing::{info, warn};
use zip::ZipArchive;

use crate::app::adb::locator::validate_program;
use crate::app::adb::parse::{online_serials, parse_adb_devices};
use crate::app::adb::runner::{run_adb, run_command_with_timeout};
use crate::app::error::{AppError, ERR_DEPENDENCY};
use crate::app::feed::ReleaseFeed;
use crate::app::models::ServerEvent;
use crate::app::platform::{android_abi_dir, AAPT2_BUNDLE_DIRS};
use crate::app::state::{AppState, EventEmitter};

pub const AAPT2_ARCHIVE: &str = "aapt2.zip";

/// Emits the JDK install hint when java cannot be spawned.
pub fn check_java(state: &AppState, emitter: &EventEmitter, trace_id: &str) -> bool {
    let program = state.java_program();
    if let Err(message) = validate_program(&program, "Java") {
        warn!(trace_id = %trace_id, error = %message, "invalid java command");
        emitter(ServerEvent::error(message));
        return false;
    }
    let args = vec!["-version".to_string()];
    match run_command_with_timeout(&program, &args, state.command_timeout(), trace_id) {
        Ok(output) => {
            // `java -version` prints to stderr.
            let version = output.primary_text().lines().next().unwrap_or("").trim().to_string();
            info!(trace_id = %trace_id, version = %version, "java available");
            true
        }
        Err(err) if err.code == ERR_DEPENDENCY => {
            warn!(trace_id = %trace_id, error = %err, "java missing");
            emitter(ServerEvent::error(state.platform.jdk_install_hint()));
            false
        }
        Err(err) => {
            warn!(trace_id = %trace_id, error = %err, "java check failed");
            emitter(ServerEvent::error(format!("Failed to run Java: {}", err.error)));
            false
        }
    }
}

fn remove_bundle_scraps(work_dir: &Path, archive: &Path) {
    for dir in AAPT2_BUNDLE_DIRS {
        let _ = fs::remove_dir_all(work_dir.join(dir));
    }
    let _ = fs::remove_file(archive);
}

#[cfg(unix)]
fn make_executable(path: &Path, trace_id: &str) -> Result<(), AppError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
        .map_err(|err| AppError::io("Failed to mark aapt2 executable", err, trace_id))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path, _trace_id: &str) -> Result<(), AppError> {
    Ok(())
}

fn install_aapt2_from_archive(
    archive: &Path,
    work_dir: &Path,
    arch: &str,
    trace_id: &str,
) -> Result<PathBuf, AppError> {
    let file = File::open(archive)
        .map_err(|err| AppError::io("Failed to open aapt2 archive", err, trace_id))?;
    let mut zip = ZipArchive::new(file)
        .map_err(|err| AppError::system(format!("Invalid aapt2 archive: {err}"), trace_id))?;
    zip.extract(work_dir)
        .map_err(|err| AppError::system(format!("Failed to extract aapt2: {err}"), trace_id))?;

    let abi = android_abi_dir(arch).ok_or_else(|| {
        AppError::dependency(format!("No prebuilt aapt2 for architecture {arch}"), trace_id)
    })?;
    let source = work_dir.join(abi).join("aapt2");
    let target = work_dir.join("aapt2");
    fs::copy(&source, &target)
        .map_err(|err| AppError::io("Failed to copy aapt2", err, trace_id))?;
    make_executable(&target, trace_id)?;
    Ok(target)
}

/// Downloads the aapt2 bundle, keeps the binary for `arch` and deletes the rest.
pub fn provision_aapt2(
    feed: &dyn ReleaseFeed,
    url: &str,
    work_dir: &Path,
    arch: &str,
    emitter: &EventEmitter,
    trace_id: &str,
) -> Result<PathBuf, AppError> {
    fs::create_dir_all(work_dir)
        .map_err(|err| AppError::io("Failed to create work dir", err, trace_id))?;
    let archive = work_dir.join(AAPT2_ARCHIVE);
    let progress = |percentage: u8| {
        emitter(ServerEvent::DownloadingFile {
            name: AAPT2_ARCHIVE.to_string(),
            percentage,
        })
    };
    feed.download(url, &archive, &progress, trace_id)?;

    let result = install_aapt2_from_archive(&archive, work_dir, arch, trace_id);
    remove_bundle_scraps(work_dir, &archive);
    result
}

/// Termux flavour: java plus a local aapt2 binary. There is no adb device.
pub fn check_jdk_and_aapt2(
    state: &AppState,
    emitter: &EventEmitter,
    trace_id: &str,
) -> Result<(), AppError> {
    state.session().devices.clear();
    if !check_java(state, emitter, trace_id) {
        warn!(trace_id = %trace_id, "continuing without a working java; builds will fail");
    }

    let work_dir = state.config.work_dir();
    if work_dir.join("aapt2").exists() {
        return Ok(());
    }
    let path = provision_aapt2(
        state.feed.as_ref(),
        &state.config.tools.aapt2_url,
        &work_dir,
        std::env::consts::ARCH,
        emitter,
        trace_id,
    )?;
    info!(trace_id = %trace_id, path = %path.display(), "aapt2 ready");
    Ok(())
}

/// Desktop flavour: java plus adb, recording online devices in the session.
pub fn check_jdk_and_adb(
    state: &AppState,
    emitter: &EventEmitter,
    trace_id: &str,
) -> Result<(), AppError> {
    if !check_java(state, emitter, trace_id) {
        warn!(trace_id = %trace_id, "continuing without a working java; builds will fail");
    }

    let args = vec!["devices".to_string(), "-l".to_string()];
    let devices = match run_adb(&state.adb_program(), &args, state.command_timeout(), trace_id) {
        Ok(output) => parse_adb_devices(&output.stdout),
        Err(err) if err.code == ERR_DEPENDENCY => {
            warn!(trace_id = %trace_id, error = %err, "adb missing");
            emitter(ServerEvent::error(
                "ADB is not installed. Install Android platform-tools to install patched apps on a device.",
            ));
            Vec::new()
        }
        Err(err) => return Err(err),
    };

    let labels: Vec<String> = devices.iter().map(|device| device.label()).collect();
    info!(trace_id = %trace_id, devices = ?labels, "adb devices");
    let serials = online_serials(&devices);
    let mut session = state.session();
    // A previously selected device that went away is replaced.
    if !session
        .device_id
        .as_ref()
        .is_some_and(|id| serials.contains(id))
    {
        session.device_id = serials.first().cloned();
    }
    session.devices = serials;
    Ok(())
}

pub fn check_prerequisites(
    state: &AppState,
    emitter: &EventEmitter,
    trace_id: &str,
) -> Result<(), AppError> {
    if state.platform.is_android() {
        check_jdk_and_aapt2(state, emitter, trace_id)
    } else {
        check_jdk_and_adb(state, emitter, trace_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::platform::HostPlatform;
    use crate::app::state::testing::{collecting_emitter, test_config, test_state, StubFeed};
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::FileOptions;

    const URL: &str = "https://example.invalid/aapt2.zip";

    fn aapt2_bundle() -> Vec<u8> {
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut zip = zip::ZipWriter::new(&mut cursor);
            for dir in AAPT2_BUNDLE_DIRS {
                zip.start_file(format!("{dir}/aapt2"), FileOptions::<()>::default())
                    .expect("entry");
                zip.write_all(format!("aapt2 for {dir}").as_bytes()).expect("write");
            }
            zip.finish().expect("finish");
        }
        cursor.into_inner()
    }

    #[test]
    fn provisions_arch_specific_aapt2_and_cleans_up() {
        let dir = TempDir::new().expect("tmp");
        let work_dir = dir.path().join("patched");
        let feed = StubFeed::default().with_content(URL, &aapt2_bundle());
        let (emitter, events) = collecting_emitter();

        let path = provision_aapt2(&feed, URL, &work_dir, "aarch64", &emitter, "trace")
            .expect("provision");

        assert_eq!(fs::read_to_string(&path).expect("read"), "aapt2 for arm64-v8a");
        for scrap in AAPT2_BUNDLE_DIRS {
            assert!(!work_dir.join(scrap).exists(), "{scrap} should be removed");
        }
        assert!(!work_dir.join(AAPT2_ARCHIVE).exists());
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&path).expect("meta").permissions().mode();
            assert_eq!(mode & 0o777, 0o755);
        }
        assert!(events
            .lock()
            .expect("events")
            .iter()
            .any(|event| matches!(event, ServerEvent::DownloadingFile { percentage: 100, .. })));
    }

    #[test]
    fn unsupported_arch_still_removes_scraps() {
        let dir = TempDir::new().expect("tmp");
        let work_dir = dir.path().join("patched");
        let feed = StubFeed::default().with_content(URL, &aapt2_bundle());
        let (emitter, _events) = collecting_emitter();

        let err = provision_aapt2(&feed, URL, &work_dir, "riscv64", &emitter, "trace")
            .expect_err("unsupported");
        assert_eq!(err.code, ERR_DEPENDENCY);
        assert!(!work_dir.join("aapt2").exists());
        assert!(!work_dir.join("x86").exists());
        assert!(!work_dir.join(AAPT2_ARCHIVE).exists());
    }

    #[test]
    fn missing_java_emits_install_hint() {
        let dir = TempDir::new().expect("tmp");
        let state = test_state(test_config(dir.path()), HostPlatform::Android, StubFeed::default());
        let (emitter, events) = collecting_emitter();

        assert!(!check_java(&state, &emitter, "trace"));
        let events = events.lock().expect("events");
        assert_eq!(
            events.as_slice(),
            &[ServerEvent::error(HostPlatform::Android.jdk_install_hint())]
        );
    }

    #[test]
    fn configured_java_path_must_exist() {
        let dir = TempDir::new().expect("tmp");
        let mut config = test_config(dir.path());
        config.tools.java_command = dir.path().join("jdk/bin/java").to_string_lossy().to_string();
        let state = test_state(config, HostPlatform::Desktop, StubFeed::default());
        let (emitter, events) = collecting_emitter();

        assert!(!check_java(&state, &emitter, "trace"));
        let events = events.lock().expect("events");
        assert!(matches!(&events[0], ServerEvent::Error { error } if error.contains("not found")));
    }

    #[test]
    fn existing_aapt2_skips_download() {
        let dir = TempDir::new().expect("tmp");
        let config = test_config(dir.path());
        fs::create_dir_all(config.work_dir()).expect("work dir");
        fs::write(config.work_dir().join("aapt2"), b"bin").expect("aapt2");
        let state = test_state(config, HostPlatform::Android, StubFeed::default());
        state.session().devices.push("stale".to_string());
        let (emitter, _events) = collecting_emitter();

        check_jdk_and_aapt2(&state, &emitter, "trace").expect("check");
        assert!(state.session().devices.is_empty());
    }

    #[test]
    fn missing_adb_reports_error_and_clears_devices() {
        let dir = TempDir::new().expect("tmp");
        let state = test_state(test_config(dir.path()), HostPlatform::Desktop, StubFeed::default());
        state.session().devices.push("stale".to_string());
        state.session().device_id = Some("stale".to_string());
        let (emitter, events) = collecting_emitter();

        check_jdk_and_adb(&state, &emitter, "trace").expect("check");
        assert!(state.session().devices.is_empty());
        assert_eq!(state.session().device_id, None);
        let events = events.lock().expect("events");
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[1], ServerEvent::Error { error } if error.contains("ADB")));
    }

    #[cfg(unix)]
    fn state_with_listed_devices(dir: &Path) -> AppState {
        use std::os::unix::fs::PermissionsExt;

        let fake_adb = dir.join("adb");
        fs::write(
            &fake_adb,
            "#!/bin/sh\nprintf 'List of devices attached\\nR58M123 device model:SM_G973F\\nemulator-5554 offline\\n'\n",
        )
        .expect("script");
        fs::set_permissions(&fake_adb, fs::Permissions::from_mode(0o755)).expect("chmod");

        let mut config = test_config(dir);
        config.tools.adb_command = fake_adb.to_string_lossy().to_string();
        test_state(config, HostPlatform::Desktop, StubFeed::default())
    }

    #[cfg(unix)]
    #[test]
    fn records_online_devices_from_adb() {
        let dir = TempDir::new().expect("tmp");
        let state = state_with_listed_devices(dir.path());
        let (emitter, _events) = collecting_emitter();

        check_jdk_and_adb(&state, &emitter, "trace").expect("check");
        let session = state.session();
        assert_eq!(session.devices, vec!["R58M123".to_string()]);
        assert_eq!(session.device_id.as_deref(), Some("R58M123"));
    }

    #[cfg(unix)]
    #[test]
    fn disconnected_device_selection_is_replaced() {
        let dir = TempDir::new().expect("tmp");
        let state = state_with_listed_devices(dir.path());
        state.session().device_id = Some("GONE".to_string());
        let (emitter, _events) = collecting_emitter();

        check_jdk_and_adb(&state, &emitter, "trace").expect("check");
        assert_eq!(state.session().device_id.as_deref(), Some("R58M123"));
    }

    #[cfg(unix)]
    #[test]
    fn connected_device_selection_is_kept() {
        let dir = TempDir::new().expect("tmp");
        let state = state_with_listed_devices(dir.path());
        state.session().device_id = Some("R58M123".to_string());
        state.session().devices = vec!["R58M123".to_string(), "R58M999".to_string()];
        let (emitter, _events) = collecting_emitter();

        check_jdk_and_adb(&state, &emitter, "trace").expect("check");
        let session = state.session();
        assert_eq!(session.device_id.as_deref(), Some("R58M123"));
        assert_eq!(session.devices, vec!["R58M123".to_string()]);
    }
}
