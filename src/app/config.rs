use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::app::error::AppError;

pub const DEFAULT_PORT: u16 = 8000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl ServerSettings {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Release feed repositories, each as an `owner/repo` slug.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceSettings {
    pub cli: String,
    pub patches: String,
    pub integrations: String,
    pub microg: String,
    pub builder: String,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            cli: "FAUZAN-CELL/fz-cli".to_string(),
            patches: "FAUZAN-CELL/fz-patches".to_string(),
            integrations: "FAUZAN-CELL/fz-integrations".to_string(),
            microg: "FAUZAN-CELL/MicroG".to_string(),
            builder: "FAUZAN-CELL/fz-builder".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PathSettings {
    pub work_dir: String,
    pub cache_dir: String,
    pub shared_storage_dir: String,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            work_dir: "patched".to_string(),
            cache_dir: "patched-cache".to_string(),
            shared_storage_dir: "/storage/emulated/0".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolSettings {
    pub java_command: String,
    pub adb_command: String,
    /// Root shell used to mount builds on rooted devices.
    #[serde(default = "default_su_command")]
    pub su_command: String,
    pub aapt2_url: String,
    pub command_timeout: i32,
    pub install_timeout: i32,
    pub download_timeout: i32,
}

fn default_su_command() -> String {
    "su".to_string()
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            java_command: "java".to_string(),
            adb_command: "adb".to_string(),
            su_command: default_su_command(),
            aapt2_url: "https://github.com/FAUZAN-CELL/fz-cli/raw/main/aapt2.zip".to_string(),
            command_timeout: 30,
            install_timeout: 180,
            download_timeout: 600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingSettings {
    pub log_level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct BuilderConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub sources: SourceSettings,
    #[serde(default)]
    pub paths: PathSettings,
    #[serde(default)]
    pub tools: ToolSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

impl BuilderConfig {
    pub fn work_dir(&self) -> PathBuf {
        PathBuf::from(&self.paths.work_dir)
    }

    pub fn cache_dir(&self) -> PathBuf {
        PathBuf::from(&self.paths.cache_dir)
    }
}

pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var("FZ_BUILDER_CONFIG_PATH") {
        return PathBuf::from(path);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".fz_builder_config.json")
}

pub fn backup_config_path() -> PathBuf {
    let mut path = config_path();
    path.set_extension("backup.json");
    path
}

pub fn load_config(trace_id: &str) -> Result<BuilderConfig, AppError> {
    load_config_from_path(&config_path(), trace_id)
}

pub fn save_config(config: &BuilderConfig, trace_id: &str) -> Result<(), AppError> {
    save_config_to_path(config, &config_path(), &backup_config_path(), trace_id)
}

pub fn load_config_from_path(path: &Path, trace_id: &str) -> Result<BuilderConfig, AppError> {
    if !path.exists() {
        return Ok(BuilderConfig::default());
    }
    let raw = fs::read_to_string(path)
        .map_err(|err| AppError::system(format!("Failed to read config: {err}"), trace_id))?;
    let value: serde_json::Value = serde_json::from_str(&raw)
        .map_err(|err| AppError::system(format!("Failed to parse config: {err}"), trace_id))?;
    let mut config: BuilderConfig = serde_json::from_value(value.clone()).unwrap_or_default();
    config = apply_legacy_overrides(config, &value);
    Ok(validate_config(config))
}

pub fn save_config_to_path(
    config: &BuilderConfig,
    path: &Path,
    backup_path: &Path,
    trace_id: &str,
) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    if path.exists() {
        let _ = fs::copy(path, backup_path);
    }
    let payload = serde_json::to_string_pretty(config)
        .map_err(|err| AppError::system(format!("Failed to serialize config: {err}"), trace_id))?;
    fs::write(path, payload)
        .map_err(|err| AppError::system(format!("Failed to write config: {err}"), trace_id))?;
    Ok(())
}

/// Older settings files kept the source slugs at the top level.
fn apply_legacy_overrides(mut config: BuilderConfig, value: &serde_json::Value) -> BuilderConfig {
    if let Some(patches) = value.get("patches").and_then(|v| v.as_str()) {
        config.sources.patches = patches.to_string();
    }
    if let Some(integrations) = value.get("integrations").and_then(|v| v.as_str()) {
        config.sources.integrations = integrations.to_string();
    }
    if let Some(port) = value.get("port").and_then(|v| v.as_u64()) {
        if let Ok(port) = u16::try_from(port) {
            config.server.port = port;
        }
    }
    config
}

fn validate_config(mut config: BuilderConfig) -> BuilderConfig {
    let defaults = SourceSettings::default();
    if parse_repo_slug(&config.sources.cli).is_none() {
        config.sources.cli = defaults.cli;
    }
    if parse_repo_slug(&config.sources.patches).is_none() {
        config.sources.patches = defaults.patches;
    }
    if parse_repo_slug(&config.sources.integrations).is_none() {
        config.sources.integrations = defaults.integrations;
    }
    if parse_repo_slug(&config.sources.microg).is_none() {
        config.sources.microg = defaults.microg;
    }
    if parse_repo_slug(&config.sources.builder).is_none() {
        config.sources.builder = defaults.builder;
    }
    if config.server.host.trim().is_empty() {
        config.server.host = "127.0.0.1".to_string();
    }
    if config.paths.work_dir.trim().is_empty() {
        config.paths.work_dir = "patched".to_string();
    }
    if config.paths.cache_dir.trim().is_empty() {
        config.paths.cache_dir = "patched-cache".to_string();
    }
    if config.tools.java_command.trim().is_empty() {
        config.tools.java_command = "java".to_string();
    }
    if config.tools.adb_command.trim().is_empty() {
        config.tools.adb_command = "adb".to_string();
    }
    if config.tools.su_command.trim().is_empty() {
        config.tools.su_command = default_su_command();
    }
    if config.tools.command_timeout < 1 {
        config.tools.command_timeout = 30;
    }
    if config.tools.install_timeout < 10 {
        config.tools.install_timeout = 180;
    }
    if config.tools.download_timeout < 10 {
        config.tools.download_timeout = 600;
    }
    config
}

/// Splits `owner/repo`; anything else is rejected.
pub fn parse_repo_slug(slug: &str) -> Option<(String, String)> {
    let (owner, repo) = slug.trim().split_once('/')?;
    let owner = owner.trim();
    let repo = repo.trim();
    if owner.is_empty() || repo.is_empty() || repo.contains('/') {
        return None;
    }
    Some((owner.to_string(), repo.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn merges_legacy_values() {
        let value = serde_json::json!({
            "patches": "someone/my-patches",
            "integrations": "someone/my-integrations",
            "port": 9001
        });
        let mut config: BuilderConfig = serde_json::from_value(value.clone()).unwrap_or_default();
        config = apply_legacy_overrides(config, &value);
        assert_eq!(config.sources.patches, "someone/my-patches");
        assert_eq!(config.sources.integrations, "someone/my-integrations");
        assert_eq!(config.server.port, 9001);
    }

    #[test]
    fn clamps_invalid_values() {
        let mut config = BuilderConfig::default();
        config.sources.patches = "not-a-slug".to_string();
        config.tools.command_timeout = 0;
        config.tools.java_command = "  ".to_string();
        config.tools.su_command = String::new();
        config.paths.work_dir = String::new();
        let validated = validate_config(config);
        assert_eq!(validated.sources.patches, "FAUZAN-CELL/fz-patches");
        assert_eq!(validated.tools.command_timeout, 30);
        assert_eq!(validated.tools.java_command, "java");
        assert_eq!(validated.paths.work_dir, "patched");
        assert_eq!(validated.tools.su_command, "su");
    }

    #[test]
    fn tools_section_without_su_command_keeps_other_values() {
        let value = serde_json::json!({
            "tools": {
                "java_command": "/opt/jdk/bin/java",
                "adb_command": "adb",
                "aapt2_url": "https://example.invalid/aapt2.zip",
                "command_timeout": 12,
                "install_timeout": 200,
                "download_timeout": 900
            }
        });
        let config: BuilderConfig = serde_json::from_value(value).expect("config");
        assert_eq!(config.tools.java_command, "/opt/jdk/bin/java");
        assert_eq!(config.tools.su_command, "su");
    }

    #[test]
    fn parses_repo_slugs() {
        assert_eq!(
            parse_repo_slug("FAUZAN-CELL/fz-cli"),
            Some(("FAUZAN-CELL".to_string(), "fz-cli".to_string()))
        );
        assert_eq!(parse_repo_slug("fz-cli"), None);
        assert_eq!(parse_repo_slug("/fz-cli"), None);
        assert_eq!(parse_repo_slug("a/b/c"), None);
    }

    #[test]
    fn save_then_load_keeps_backup() {
        let dir = TempDir::new().expect("tmp");
        let path = dir.path().join("config.json");
        let backup = dir.path().join("config.backup.json");

        let mut config = BuilderConfig::default();
        config.server.port = 8123;
        save_config_to_path(&config, &path, &backup, "trace").expect("save");
        assert!(!backup.exists());

        config.sources.patches = "other/patches".to_string();
        save_config_to_path(&config, &path, &backup, "trace").expect("save again");
        assert!(backup.exists());

        let loaded = load_config_from_path(&path, "trace").expect("load");
        assert_eq!(loaded.server.port, 8123);
        assert_eq!(loaded.sources.patches, "other/patches");
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = TempDir::new().expect("tmp");
        let loaded = load_config_from_path(&dir.path().join("absent.json"), "trace").expect("load");
        assert_eq!(loaded, BuilderConfig::default());
        assert_eq!(loaded.server.bind_address(), "127.0.0.1:8000");
    }
}
