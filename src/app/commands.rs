use std::sync::Arc;
use std::thread::JoinHandle;

use tracing::{info, warn};
use uuid::Uuid;

use crate::app::error::AppError;
use crate::app::models::{ClientMessage, ServerEvent};
use crate::app::patcher::relay::patch_app;
use crate::app::session::{ApkMeta, SelectedApp};
use crate::app::state::{AppState, EventEmitter};
use crate::app::sync::{check_for_updates, update_files};

pub fn resolve_trace_id(input: Option<String>) -> String {
    input
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

fn ensure_non_empty(value: &str, field: &str, trace_id: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::validation(
            format!("{field} is required"),
            trace_id,
        ));
    }
    Ok(())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

pub fn parse_message(text: &str, trace_id: &str) -> Result<ClientMessage, AppError> {
    serde_json::from_str(text)
        .map_err(|err| AppError::validation(format!("Invalid message: {err}"), trace_id))
}

/// Turns a failed handler into the client `error` event.
pub fn report_error(err: AppError, emitter: &EventEmitter) {
    if err.is_busy() {
        info!(trace_id = %err.trace_id, code = %err.code, "request rejected while busy");
    } else {
        warn!(trace_id = %err.trace_id, code = %err.code, error = %err.error, "request failed");
    }
    emitter(ServerEvent::error(err.error));
}

fn spawn_handler<F>(name: &'static str, emitter: &EventEmitter, trace_id: String, job: F) -> JoinHandle<()>
where
    F: FnOnce(&EventEmitter, &str) -> Result<(), AppError> + Send + 'static,
{
    let emitter = Arc::clone(emitter);
    std::thread::spawn(move || {
        info!(trace_id = %trace_id, handler = name, "handler started");
        if let Err(err) = job(&emitter, &trace_id) {
            report_error(err, &emitter);
        }
    })
}

fn apply_session_message(
    state: &AppState,
    message: ClientMessage,
    trace_id: &str,
) -> Result<(), AppError> {
    let mut session = state.session();
    match message {
        ClientMessage::SelectApp {
            package_name,
            app_name,
            version,
            arch,
        } => {
            ensure_non_empty(&package_name, "packageName", trace_id)?;
            session.selected_app = Some(SelectedApp {
                package_name: package_name.trim().to_string(),
                app_name: non_blank(app_name),
            });
            session.apk = ApkMeta {
                version: non_blank(version),
                arch: non_blank(arch),
            };
            session.output_name = None;
        }
        ClientMessage::SelectPatches {
            patches,
            integrations,
        } => {
            session.patches = patches
                .into_iter()
                .filter(|entry| !entry.trim().is_empty())
                .collect();
            session.use_integrations = integrations;
        }
        ClientMessage::SelectDevice {
            device_id,
            is_rooted,
        } => {
            session.device_id = non_blank(device_id);
            session.is_rooted = is_rooted;
        }
        ClientMessage::UpdateFiles | ClientMessage::CheckForUpdates | ClientMessage::PatchApp => {}
    }
    info!(trace_id = %trace_id, package = ?session.package_name(), "session updated");
    Ok(())
}

/// Runs one client message. Long-running work gets its own thread whose
/// handle is returned.
pub fn handle_message(
    state: &Arc<AppState>,
    message: ClientMessage,
    emitter: &EventEmitter,
    trace_id: String,
) -> Option<JoinHandle<()>> {
    info!(trace_id = %trace_id, event = message.name(), "client message");
    match message {
        ClientMessage::UpdateFiles => {
            let state = Arc::clone(state);
            Some(spawn_handler("updateFiles", emitter, trace_id, move |emitter, trace_id| {
                update_files(&state, emitter, trace_id)
            }))
        }
        ClientMessage::CheckForUpdates => {
            let state = Arc::clone(state);
            Some(spawn_handler("checkForUpdates", emitter, trace_id, move |emitter, trace_id| {
                check_for_updates(&state, emitter, trace_id)
            }))
        }
        ClientMessage::PatchApp => {
            let state = Arc::clone(state);
            Some(spawn_handler("patchApp", emitter, trace_id, move |emitter, trace_id| {
                patch_app(state, Arc::clone(emitter), trace_id)?.wait();
                Ok(())
            }))
        }
        message => {
            if let Err(err) = apply_session_message(state, message, &trace_id) {
                report_error(err, emitter);
            }
            None
        }
    }
}

/// Entry point for a raw text frame.
pub fn handle_text(
    state: &Arc<AppState>,
    text: &str,
    emitter: &EventEmitter,
) -> Option<JoinHandle<()>> {
    let trace_id = resolve_trace_id(None);
    match parse_message(text, &trace_id) {
        Ok(message) => handle_message(state, message, emitter, trace_id),
        Err(err) => {
            report_error(err, emitter);
            None
        }
    }
}
