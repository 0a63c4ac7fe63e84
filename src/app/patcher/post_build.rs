use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{error, info, warn};

use crate::app::adb::install::reinstall_patched;
use crate::app::adb::mount::mount_patched_apk;
use crate::app::error::AppError;
use crate::app::models::{ApkInstallErrorCode, ServerEvent};
use crate::app::patcher::args::RAW_OUTPUT_NAME;
use crate::app::process::os_description;
use crate::app::state::{AppState, EventEmitter};

pub const ISSUES_URL: &str = "https://github.com/FAUZAN-CELL/fz-builder/issues";
pub const FAILURE_MESSAGE: &str =
    "An error occured while starting the patching process. Please see the server console.";
pub const MICROG_SHARED_NAME: &str = "MicroG.apk";

fn copy_into(source: &Path, target: &Path, trace_id: &str) -> Result<(), AppError> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)
            .map_err(|err| AppError::io("Failed to create shared storage dir", err, trace_id))?;
    }
    fs::copy(source, target)
        .map_err(|err| AppError::io(&format!("Failed to copy {}", source.display()), err, trace_id))?;
    Ok(())
}

fn copy_to_shared_storage(
    state: &AppState,
    artifact: &Path,
    output_name: &str,
    microg: Option<&Path>,
    emitter: &EventEmitter,
    trace_id: &str,
) -> Result<(), AppError> {
    let shared = PathBuf::from(&state.config.paths.shared_storage_dir);
    copy_into(artifact, &shared.join(output_name), trace_id)?;
    match microg {
        Some(microg) => copy_into(microg, &shared.join(MICROG_SHARED_NAME), trace_id)?,
        None => warn!(trace_id = %trace_id, "MicroG not downloaded; skipping copy"),
    }
    let shared_display = shared.display();
    emitter(ServerEvent::log(format!(
        "Copied files over to {shared_display}/!\nPlease install app, its located in {shared_display}/{output_name}\nand if you are building YT/YT Music without root, also install {shared_display}/{MICROG_SHARED_NAME}."
    )));
    Ok(())
}

/// Packages a finished build: cleans up, renames the artifact and hands it
/// over according to the host platform. Ends with `buildFinished`.
pub fn after_build(
    state: &AppState,
    emitter: &EventEmitter,
    trace_id: &str,
) -> Result<(), AppError> {
    // A lingering patcher keeps the cache dir busy.
    let killed = state.killer.kill_by_name("java");
    info!(trace_id = %trace_id, killed, "after build");

    let cache_dir = state.config.cache_dir();
    if cache_dir.exists() {
        if let Err(err) = fs::remove_dir_all(&cache_dir) {
            warn!(trace_id = %trace_id, error = %err, "failed to remove patcher cache");
        }
    }

    let session = {
        let mut session = state.session();
        session.refresh_output_name();
        session.clone()
    };
    let output_name = session.output_name.clone().unwrap_or_default();
    let work_dir = state.config.work_dir();
    let artifact = work_dir.join(&output_name);
    fs::rename(work_dir.join(RAW_OUTPUT_NAME), &artifact)
        .map_err(|err| AppError::io("Failed to rename patched APK", err, trace_id))?;
    info!(trace_id = %trace_id, artifact = %artifact.display(), "artifact ready");

    if state.platform.is_android() && !session.is_rooted {
        copy_to_shared_storage(
            state,
            &artifact,
            &output_name,
            session.microg.as_deref(),
            emitter,
            trace_id,
        )?;
    } else if state.platform.is_android() {
        emitter(ServerEvent::log("Trying to mount Patch..."));
        let package_name = session.package_name().unwrap_or_default();
        match mount_patched_apk(
            &state.su_program(),
            package_name,
            &artifact,
            state.command_timeout(),
            trace_id,
        ) {
            Ok(_) => emitter(ServerEvent::log("Patch mounted successfully.")),
            Err(err) => {
                warn!(trace_id = %trace_id, error = %err, "mount failed");
                emitter(ServerEvent::error(err.error));
            }
        }
    } else if !session.has_device() {
        let microg = session
            .microg
            .clone()
            .unwrap_or_else(|| work_dir.join(MICROG_SHARED_NAME));
        emitter(ServerEvent::log(format!(
            "Patch has been built!\nPlease transfer over {} and if you are using YT/YT Music, {} and install them!",
            artifact.display(),
            microg.display()
        )));
    }

    emitter(ServerEvent::BuildFinished {
        install: session.has_device().then_some(true),
    });
    Ok(())
}

/// APK a reinstall should push: the fresh patcher output, or the renamed
/// artifact once this build has been packaged.
pub fn reinstall_target(state: &AppState, packaged: bool) -> PathBuf {
    let work_dir = state.config.work_dir();
    if packaged {
        if let Some(name) = state.session().output_name.clone() {
            return work_dir.join(name);
        }
    }
    work_dir.join(RAW_OUTPUT_NAME)
}

/// Uninstalls the conflicting patched package and installs `apk` on the
/// selected device.
pub fn reinstall(
    state: &AppState,
    apk: &Path,
    emitter: &EventEmitter,
    trace_id: &str,
) -> Result<(), AppError> {
    let session = state.session_snapshot();
    let serial = session
        .device_id
        .clone()
        .ok_or_else(|| AppError::validation("No device selected for reinstall", trace_id))?;
    let package_name = session
        .package_name()
        .ok_or_else(|| AppError::validation("No app selected", trace_id))?;

    emitter(ServerEvent::log("Reinstalling patched app..."));
    let result = reinstall_patched(
        &state.adb_program(),
        &serial,
        package_name,
        session.is_rooted,
        apk,
        state.install_timeout(),
        trace_id,
    )?;
    if result != ApkInstallErrorCode::Success {
        return Err(AppError::system(
            format!("Reinstall failed: {} ({})", result.description(), result.code()),
            trace_id,
        ));
    }
    Ok(())
}

/// Tells the client the build broke and dumps host details for a bug report.
pub fn report_failure(args: &[String], emitter: &EventEmitter, trace_id: &str) {
    emitter(ServerEvent::error(FAILURE_MESSAGE));
    error!(
        trace_id = %trace_id,
        os = std::env::consts::OS,
        os_version = %os_description(),
        arguments = %args.join(", "),
        timestamp = %Utc::now().to_rfc3339(),
        "patching failed; please report these details to {}",
        ISSUES_URL
    );
}
