use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedApp {
    pub package_name: String,
    pub app_name: Option<String>,
}

/// Metadata of the input APK, known only when the UI downloaded it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApkMeta {
    pub version: Option<String>,
    pub arch: Option<String>,
}

/// In-memory state of one patching run.
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub selected_app: Option<SelectedApp>,
    pub apk: ApkMeta,
    pub cli_jar: Option<PathBuf>,
    pub patches_jar: Option<PathBuf>,
    pub integrations: Option<PathBuf>,
    pub microg: Option<PathBuf>,
    pub patches: Vec<String>,
    pub use_integrations: bool,
    pub is_rooted: bool,
    pub device_id: Option<String>,
    pub devices: Vec<String>,
    pub output_name: Option<String>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn package_name(&self) -> Option<&str> {
        self.selected_app
            .as_ref()
            .map(|app| app.package_name.as_str())
            .filter(|name| !name.trim().is_empty())
    }

    pub fn has_device(&self) -> bool {
        self.devices.first().is_some()
    }

    /// Computes and stores the artifact file name.
    pub fn refresh_output_name(&mut self) -> String {
        let name = build_output_name(self);
        self.output_name = Some(name.clone());
        name
    }
}

fn app_name_filter() -> &'static Regex {
    static FILTER: OnceLock<Regex> = OnceLock::new();
    FILTER.get_or_init(|| Regex::new(r"[^a-zA-Z0-9.\-]").expect("static regex"))
}

fn jar_version(path: Option<&Path>, prefix: &str) -> String {
    path.and_then(|p| p.file_name())
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default()
        .replace(prefix, "")
        .replace(".jar", "")
}

/// `Patched-<AppName>-v<Version>-<Arch>-cli_<CliVersion>-patches_<PatchesVersion>.apk`,
/// with unknown parts left out.
pub fn build_output_name(session: &Session) -> String {
    let app_part = match &session.selected_app {
        Some(SelectedApp {
            app_name: Some(name),
            ..
        }) if !name.trim().is_empty() => app_name_filter().replace_all(name, "").to_string(),
        Some(app) => app.package_name.replace('.', ""),
        None => String::new(),
    };
    let version_part = session
        .apk
        .version
        .as_ref()
        .filter(|v| !v.trim().is_empty())
        .map(|v| format!("v{v}"))
        .unwrap_or_default();
    let arch_part = session.apk.arch.clone().unwrap_or_default();
    let cli_part = format!("cli_{}", jar_version(session.cli_jar.as_deref(), "fz-cli-"));
    let patches_part = format!(
        "patches_{}",
        jar_version(session.patches_jar.as_deref(), "fz-patches-")
    );

    let parts = [
        "Patched".to_string(),
        app_part,
        version_part,
        arch_part,
        cli_part,
        patches_part,
    ];
    let joined = parts
        .iter()
        .filter(|part| !part.is_empty())
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join("-");
    format!("{joined}.apk")
}
