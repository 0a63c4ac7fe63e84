use std::io::{BufRead, BufReader, Read};
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use tracing::{info, warn};

use crate::app::error::AppError;
use crate::app::guard::OnceFlag;
use crate::app::models::ServerEvent;
use crate::app::patcher::args::{build_invocation, input_apk_path};
use crate::app::patcher::markers::BuildMarker;
use crate::app::patcher::post_build::{after_build, reinstall, reinstall_target, report_failure};
use crate::app::state::{AppState, EventEmitter};

/// Shared by the stream readers and the exit watcher of one build.
struct BuildRun {
    state: Arc<AppState>,
    emitter: EventEmitter,
    trace_id: String,
    args: Vec<String>,
    /// Serializes reinstall and packaging across the two readers.
    packaging: Mutex<()>,
    reinstalled: OnceFlag,
    completed: OnceFlag,
    failed: OnceFlag,
}

impl BuildRun {
    fn handle_line(&self, line: &str) {
        (self.emitter)(ServerEvent::log(line));
        match BuildMarker::detect(line) {
            Some(BuildMarker::InstallConflict) => {
                self.reinstall_once();
                self.complete();
            }
            Some(BuildMarker::Finished) => self.complete(),
            Some(BuildMarker::Unmatched) => {
                if self.failed.fire() {
                    report_failure(&self.args, &self.emitter, &self.trace_id);
                }
            }
            None => {}
        }
    }

    fn lock_packaging(&self) -> std::sync::MutexGuard<'_, ()> {
        self.packaging
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn reinstall_once(&self) {
        let _packaging = self.lock_packaging();
        if !self.reinstalled.fire() {
            return;
        }
        info!(trace_id = %self.trace_id, "install conflict; reinstalling");
        let apk = reinstall_target(&self.state, self.completed.has_fired());
        if let Err(err) = reinstall(&self.state, &apk, &self.emitter, &self.trace_id) {
            self.emit_error(err);
        }
    }

    fn complete(&self) {
        let _packaging = self.lock_packaging();
        if !self.completed.fire() {
            return;
        }
        if let Err(err) = after_build(&self.state, &self.emitter, &self.trace_id) {
            self.emit_error(err);
        }
    }

    fn emit_error(&self, err: AppError) {
        warn!(trace_id = %err.trace_id, code = %err.code, error = %err.error, "build step failed");
        (self.emitter)(ServerEvent::error(err.error));
    }
}

fn spawn_reader<R: Read + Send + 'static>(
    stream: R,
    label: &'static str,
    run: Arc<BuildRun>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        let mut reader = BufReader::new(stream);
        let mut buffer = Vec::new();
        loop {
            buffer.clear();
            match reader.read_until(b'\n', &mut buffer) {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buffer);
                    let line = line.trim_end_matches(['\r', '\n']);
                    if !line.is_empty() {
                        run.handle_line(line);
                    }
                }
                Err(err) => {
                    warn!(trace_id = %run.trace_id, stream = label, error = %err, "failed to read patcher output");
                    break;
                }
            }
        }
    })
}

/// Running patcher; the build keeps going when this is dropped.
pub struct BuildHandle {
    watcher: JoinHandle<()>,
}

impl BuildHandle {
    /// Blocks until the process exited and both streams are drained.
    pub fn wait(self) {
        let _ = self.watcher.join();
    }
}

/// Starts the patcher for the current session and relays its output.
pub fn patch_app(
    state: Arc<AppState>,
    emitter: EventEmitter,
    trace_id: &str,
) -> Result<BuildHandle, AppError> {
    let session = state.session_snapshot();
    let invocation = build_invocation(
        &state.config,
        state.platform,
        &state.java_program(),
        &session,
        trace_id,
    )?;
    let package_name = session.package_name().unwrap_or_default();
    let input = input_apk_path(&state.config.work_dir(), package_name);
    if !input.is_file() {
        return Err(AppError::validation(
            format!("Input APK not found: {}", input.display()),
            trace_id,
        ));
    }

    info!(trace_id = %trace_id, command = %invocation.command_line(), "starting patcher");
    let mut child = Command::new(&invocation.program)
        .args(&invocation.args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                AppError::dependency(state.platform.jdk_install_hint(), trace_id)
            } else {
                AppError::system(format!("Failed to start patcher: {err}"), trace_id)
            }
        })?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AppError::system("Failed to capture patcher stdout", trace_id))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| AppError::system("Failed to capture patcher stderr", trace_id))?;

    let run = Arc::new(BuildRun {
        state,
        emitter,
        trace_id: trace_id.to_string(),
        args: invocation.args,
        packaging: Mutex::new(()),
        reinstalled: OnceFlag::new(),
        completed: OnceFlag::new(),
        failed: OnceFlag::new(),
    });
    let stdout_reader = spawn_reader(stdout, "stdout", Arc::clone(&run));
    let stderr_reader = spawn_reader(stderr, "stderr", Arc::clone(&run));

    let watcher = std::thread::spawn(move || {
        let status = child.wait();
        let _ = stdout_reader.join();
        let _ = stderr_reader.join();
        match status {
            Ok(status) => {
                info!(trace_id = %run.trace_id, exit_code = ?status.code(), "patcher exited");
                if !status.success() && !run.completed.has_fired() && !run.failed.has_fired() {
                    let code = status
                        .code()
                        .map(|code| code.to_string())
                        .unwrap_or_else(|| "signal".to_string());
                    (run.emitter)(ServerEvent::error(format!(
                        "The patcher exited unexpectedly ({code}). Please see the server console."
                    )));
                }
            }
            Err(err) => {
                warn!(trace_id = %run.trace_id, error = %err, "failed to wait for patcher");
            }
        }
    });

    Ok(BuildHandle { watcher })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::app::patcher::args::RAW_OUTPUT_NAME;
    use crate::app::patcher::post_build::FAILURE_MESSAGE;
    use crate::app::platform::HostPlatform;
    use crate::app::session::SelectedApp;
    use crate::app::state::testing::{collecting_emitter, test_config, test_state, StubFeed};
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    /// `body` runs as the fake java; `$work` is the work dir.
    fn state_with_fake_java(dir: &Path, body: &str) -> Arc<AppState> {
        let mut config = test_config(dir);
        let work_dir = config.work_dir();
        fs::create_dir_all(&work_dir).expect("work dir");
        let fake_java = dir.join("java");
        fs::write(
            &fake_java,
            format!("#!/bin/sh\nwork='{}'\n{body}\n", work_dir.display()),
        )
        .expect("script");
        fs::set_permissions(&fake_java, fs::Permissions::from_mode(0o755)).expect("chmod");
        config.tools.java_command = fake_java.to_string_lossy().to_string();

        fs::write(work_dir.join("com.google.android.youtube.apk"), b"stock").expect("input");
        let state = test_state(config, HostPlatform::Desktop, StubFeed::default());
        {
            let mut session = state.session();
            session.selected_app = Some(SelectedApp {
                package_name: "com.google.android.youtube".to_string(),
                app_name: Some("YouTube".to_string()),
            });
            session.cli_jar = Some(work_dir.join("fz-cli-2.1.0-all.jar"));
            session.patches_jar = Some(work_dir.join("fz-patches-3.4.0.jar"));
        }
        Arc::new(state)
    }

    fn count(events: &[ServerEvent], predicate: impl Fn(&ServerEvent) -> bool) -> usize {
        events.iter().filter(|event| predicate(event)).count()
    }

    #[test]
    fn relays_lines_and_packages_once() {
        let dir = TempDir::new().expect("tmp");
        let state = state_with_fake_java(
            dir.path(),
            &format!(
                "echo 'INFO: Decoding resources'\necho stock > \"$work/{RAW_OUTPUT_NAME}\"\necho 'INFO: Finished'\necho 'INFO: Finished' >&2"
            ),
        );
        let (emitter, events) = collecting_emitter();

        patch_app(Arc::clone(&state), emitter, "trace").expect("spawn").wait();

        let events = events.lock().expect("events");
        assert!(events.contains(&ServerEvent::log("INFO: Decoding resources")));
        assert_eq!(
            count(&events, |e| matches!(e, ServerEvent::PatchLog { log } if log == "INFO: Finished")),
            2
        );
        assert_eq!(
            count(&events, |e| matches!(e, ServerEvent::BuildFinished { .. })),
            1
        );
        assert!(state
            .config
            .work_dir()
            .join("Patched-YouTube-cli_2.1.0-all-patches_3.4.0.apk")
            .is_file());
    }

    #[test]
    fn unmatched_reports_failure_once() {
        let dir = TempDir::new().expect("tmp");
        let state = state_with_fake_java(
            dir.path(),
            "echo 'SEVERE: Unmatched patches: foo' >&2\necho 'SEVERE: Unmatched patches: bar' >&2\nexit 1",
        );
        let (emitter, events) = collecting_emitter();

        patch_app(state, emitter, "trace").expect("spawn").wait();

        let events = events.lock().expect("events");
        assert_eq!(
            count(&events, |e| matches!(e, ServerEvent::Error { .. })),
            1
        );
        assert!(events.contains(&ServerEvent::error(FAILURE_MESSAGE)));
    }

    #[test]
    fn silent_crash_emits_error() {
        let dir = TempDir::new().expect("tmp");
        let state = state_with_fake_java(dir.path(), "echo 'Exception in thread main'\nexit 3");
        let (emitter, events) = collecting_emitter();

        patch_app(state, emitter, "trace").expect("spawn").wait();

        let events = events.lock().expect("events");
        assert!(matches!(
            events.last(),
            Some(ServerEvent::Error { error }) if error.contains("(3)")
        ));
    }

    /// Rebuilds `state` around a fake adb that logs its arguments and copies
    /// installed APKs to `installed.apk`.
    fn with_fake_adb(state: Arc<AppState>, dir: &Path) -> (Arc<AppState>, PathBuf) {
        let log = dir.join("adb.log");
        let fake_adb = dir.join("adb");
        fs::write(
            &fake_adb,
            format!(
                "#!/bin/sh\necho \"$@\" >> '{}'\n[ \"$3\" = install ] && cp \"$4\" '{}'\necho Success\n",
                log.display(),
                dir.join("installed.apk").display(),
            ),
        )
        .expect("adb script");
        fs::set_permissions(&fake_adb, fs::Permissions::from_mode(0o755)).expect("chmod");
        let mut config = state.config.clone();
        config.tools.adb_command = fake_adb.to_string_lossy().to_string();
        let rebuilt = test_state(config, HostPlatform::Desktop, StubFeed::default());
        *rebuilt.session() = state.session_snapshot();
        rebuilt.session().device_id = Some("R58M123".to_string());
        rebuilt.session().devices = vec!["R58M123".to_string()];
        (Arc::new(rebuilt), log)
    }

    #[test]
    fn install_conflict_reinstalls_then_packages() {
        let dir = TempDir::new().expect("tmp");
        let state = state_with_fake_java(
            dir.path(),
            &format!(
                "echo fresh > \"$work/{RAW_OUTPUT_NAME}\"\necho 'Failure [INSTALL_FAILED_UPDATE_INCOMPATIBLE]'"
            ),
        );
        let (state, log) = with_fake_adb(state, dir.path());
        let (emitter, events) = collecting_emitter();

        patch_app(Arc::clone(&state), emitter, "trace").expect("spawn").wait();

        let calls = fs::read_to_string(&log).expect("adb log");
        assert!(calls.contains("uninstall app.fz.android.youtube"));
        assert_eq!(
            fs::read_to_string(dir.path().join("installed.apk")).expect("installed"),
            "fresh\n"
        );
        let events = events.lock().expect("events");
        assert_eq!(
            events.last(),
            Some(&ServerEvent::BuildFinished { install: Some(true) })
        );
    }

    #[test]
    fn conflict_on_both_streams_reinstalls_once() {
        let dir = TempDir::new().expect("tmp");
        let state = state_with_fake_java(
            dir.path(),
            &format!(
                "echo fresh > \"$work/{RAW_OUTPUT_NAME}\"\necho 'Failure [INSTALL_FAILED_UPDATE_INCOMPATIBLE]'\necho 'Failure [INSTALL_FAILED_UPDATE_INCOMPATIBLE]' >&2"
            ),
        );
        let (state, log) = with_fake_adb(state, dir.path());
        let (emitter, events) = collecting_emitter();

        patch_app(state, emitter, "trace").expect("spawn").wait();

        let calls = fs::read_to_string(&log).expect("adb log");
        assert_eq!(calls.matches(" uninstall ").count(), 1);
        assert_eq!(calls.matches(" install ").count(), 1);
        let events = events.lock().expect("events");
        assert_eq!(count(&events, |e| matches!(e, ServerEvent::Error { .. })), 0);
        assert_eq!(
            count(&events, |e| matches!(e, ServerEvent::BuildFinished { .. })),
            1
        );
        assert_eq!(
            events.last(),
            Some(&ServerEvent::BuildFinished { install: Some(true) })
        );
    }

    #[test]
    fn conflict_after_finished_reinstalls_packaged_artifact() {
        let dir = TempDir::new().expect("tmp");
        let state = state_with_fake_java(
            dir.path(),
            &format!(
                "echo fresh > \"$work/{RAW_OUTPUT_NAME}\"\necho 'INFO: Finished'\nsleep 1\necho 'Failure [INSTALL_FAILED_UPDATE_INCOMPATIBLE]'"
            ),
        );
        let (state, log) = with_fake_adb(state, dir.path());
        let (emitter, events) = collecting_emitter();

        patch_app(Arc::clone(&state), emitter, "trace").expect("spawn").wait();

        let artifact = state
            .config
            .work_dir()
            .join("Patched-YouTube-cli_2.1.0-all-patches_3.4.0.apk");
        let calls = fs::read_to_string(&log).expect("adb log");
        assert!(calls.contains(&format!("install {}", artifact.display())));
        assert_eq!(
            fs::read_to_string(dir.path().join("installed.apk")).expect("installed"),
            "fresh\n"
        );
        let events = events.lock().expect("events");
        assert_eq!(count(&events, |e| matches!(e, ServerEvent::Error { .. })), 0);
    }

    #[test]
    fn missing_input_apk_is_rejected() {
        let dir = TempDir::new().expect("tmp");
        let state = state_with_fake_java(dir.path(), "echo never");
        fs::remove_file(state.config.work_dir().join("com.google.android.youtube.apk"))
            .expect("remove");
        let (emitter, events) = collecting_emitter();

        let err = patch_app(state, emitter, "trace").err().expect("rejected");
        assert!(err.error.contains("Input APK not found"));
        assert!(events.lock().expect("events").is_empty());
    }
}
