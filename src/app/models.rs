use serde::{Deserialize, Serialize};

/// Messages pushed to the UI client. Serialized as `{"event": "<name>", ...}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum ServerEvent {
    Error {
        error: String,
    },
    #[serde(rename_all = "camelCase")]
    NotUpToDate {
        builder_version: String,
        current_version: String,
    },
    #[serde(rename_all = "camelCase")]
    UpToDate {
        current_version: String,
    },
    PatchLog {
        log: String,
    },
    BuildFinished {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        install: Option<bool>,
    },
    Finished,
    DownloadingFile {
        name: String,
        percentage: u8,
    },
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error {
            error: message.into(),
        }
    }

    pub fn log(message: impl Into<String>) -> Self {
        ServerEvent::PatchLog {
            log: message.into(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Error { .. } => "error",
            ServerEvent::NotUpToDate { .. } => "notUpToDate",
            ServerEvent::UpToDate { .. } => "upToDate",
            ServerEvent::PatchLog { .. } => "patchLog",
            ServerEvent::BuildFinished { .. } => "buildFinished",
            ServerEvent::Finished => "finished",
            ServerEvent::DownloadingFile { .. } => "downloadingFile",
        }
    }
}

/// Requests sent by the UI client, discriminated by `event`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum ClientMessage {
    UpdateFiles,
    CheckForUpdates,
    PatchApp,
    #[serde(rename_all = "camelCase")]
    SelectApp {
        package_name: String,
        #[serde(default)]
        app_name: Option<String>,
        #[serde(default)]
        version: Option<String>,
        #[serde(default)]
        arch: Option<String>,
    },
    SelectPatches {
        #[serde(default)]
        patches: Vec<String>,
        #[serde(default)]
        integrations: bool,
    },
    #[serde(rename_all = "camelCase")]
    SelectDevice {
        #[serde(default)]
        device_id: Option<String>,
        #[serde(default)]
        is_rooted: bool,
    },
}

impl ClientMessage {
    pub fn name(&self) -> &'static str {
        match self {
            ClientMessage::UpdateFiles => "updateFiles",
            ClientMessage::CheckForUpdates => "checkForUpdates",
            ClientMessage::PatchApp => "patchApp",
            ClientMessage::SelectApp { .. } => "selectApp",
            ClientMessage::SelectPatches { .. } => "selectPatches",
            ClientMessage::SelectDevice { .. } => "selectDevice",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceSummary {
    pub serial: String,
    pub state: String,
    pub model: Option<String>,
}

impl DeviceSummary {
    pub fn is_online(&self) -> bool {
        self.state == "device"
    }

    /// `serial (model)` for logs, or the bare serial.
    pub fn label(&self) -> String {
        match &self.model {
            Some(model) => format!("{} ({model})", self.serial),
            None => self.serial.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReleaseAsset {
    pub name: String,
    pub browser_download_url: String,
    #[serde(default)]
    pub size: u64,
}

/// The subset of a GitHub release payload the builder reads.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReleaseInfo {
    pub tag_name: String,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

impl ReleaseInfo {
    pub fn asset_with_extension(&self, extension: &str) -> Option<&ReleaseAsset> {
        let suffix = format!(".{}", extension.trim_start_matches('.').to_lowercase());
        self.assets
            .iter()
            .find(|asset| asset.name.to_lowercase().ends_with(&suffix))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ApkInstallErrorCode {
    Success,
    InstallFailedAlreadyExists,
    InstallFailedUpdateIncompatible,
    InstallFailedVersionDowngrade,
    InstallFailedInsufficientStorage,
    InstallParseFailedNoCertificates,
    InstallFailedNoMatchingAbis,
    UnknownError,
}

impl ApkInstallErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            ApkInstallErrorCode::Success => "SUCCESS",
            ApkInstallErrorCode::InstallFailedAlreadyExists => "INSTALL_FAILED_ALREADY_EXISTS",
            ApkInstallErrorCode::InstallFailedUpdateIncompatible => {
                "INSTALL_FAILED_UPDATE_INCOMPATIBLE"
            }
            ApkInstallErrorCode::InstallFailedVersionDowngrade => {
                "INSTALL_FAILED_VERSION_DOWNGRADE"
            }
            ApkInstallErrorCode::InstallFailedInsufficientStorage => {
                "INSTALL_FAILED_INSUFFICIENT_STORAGE"
            }
            ApkInstallErrorCode::InstallParseFailedNoCertificates => {
                "INSTALL_PARSE_FAILED_NO_CERTIFICATES"
            }
            ApkInstallErrorCode::InstallFailedNoMatchingAbis => "INSTALL_FAILED_NO_MATCHING_ABIS",
            ApkInstallErrorCode::UnknownError => "UNKNOWN_ERROR",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ApkInstallErrorCode::Success => "Installation successful",
            ApkInstallErrorCode::InstallFailedAlreadyExists => {
                "App already installed with different signature"
            }
            ApkInstallErrorCode::InstallFailedUpdateIncompatible => {
                "Update incompatible with existing installation"
            }
            ApkInstallErrorCode::InstallFailedVersionDowngrade => {
                "Cannot downgrade - uninstall first"
            }
            ApkInstallErrorCode::InstallFailedInsufficientStorage => {
                "Not enough storage space on device"
            }
            ApkInstallErrorCode::InstallParseFailedNoCertificates => "APK is not signed",
            ApkInstallErrorCode::InstallFailedNoMatchingAbis => {
                "APK not compatible with device CPU architecture"
            }
            ApkInstallErrorCode::UnknownError => "Unknown installation error",
        }
    }

    pub fn from_output(output: &str) -> Self {
        if output.is_empty() {
            return ApkInstallErrorCode::UnknownError;
        }
        let upper = output.to_uppercase();
        for code in [
            ApkInstallErrorCode::InstallFailedAlreadyExists,
            ApkInstallErrorCode::InstallFailedUpdateIncompatible,
            ApkInstallErrorCode::InstallFailedVersionDowngrade,
            ApkInstallErrorCode::InstallFailedInsufficientStorage,
            ApkInstallErrorCode::InstallParseFailedNoCertificates,
            ApkInstallErrorCode::InstallFailedNoMatchingAbis,
        ] {
            if upper.contains(code.code()) {
                return code;
            }
        }
        if upper.contains("SUCCESS") {
            return ApkInstallErrorCode::Success;
        }
        ApkInstallErrorCode::UnknownError
    }
}
