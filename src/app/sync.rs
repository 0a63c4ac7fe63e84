use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::app::config::{parse_repo_slug, BuilderConfig};
use crate::app::error::AppError;
use crate::app::feed::ReleaseFeed;
use crate::app::models::ServerEvent;
use crate::app::prereq::check_prerequisites;
use crate::app::state::{AppState, EventEmitter};

pub const CURRENT_VERSION: &str = concat!("v", env!("CARGO_PKG_VERSION"));

pub const DOWNLOAD_IN_PROGRESS: &str =
    "Downloading process hasn't finished and you tried to download again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    Cli,
    Patches,
    Integrations,
    MicroG,
}

impl ToolKind {
    pub fn extension(&self) -> &'static str {
        match self {
            ToolKind::Cli | ToolKind::Patches => "jar",
            ToolKind::Integrations | ToolKind::MicroG => "apk",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolSource {
    pub kind: ToolKind,
    pub owner: String,
    pub repo: String,
}

pub fn tool_sources(config: &BuilderConfig, trace_id: &str) -> Result<Vec<ToolSource>, AppError> {
    [
        (ToolKind::Cli, &config.sources.cli),
        (ToolKind::Patches, &config.sources.patches),
        (ToolKind::Integrations, &config.sources.integrations),
        (ToolKind::MicroG, &config.sources.microg),
    ]
    .into_iter()
    .map(|(kind, slug)| {
        let (owner, repo) = parse_repo_slug(slug).ok_or_else(|| {
            AppError::validation(format!("Invalid source repository: {slug}"), trace_id)
        })?;
        Ok(ToolSource { kind, owner, repo })
    })
    .collect()
}

/// Fetches the latest release asset of `source` into `work_dir`, reusing a
/// previously downloaded file of the same name.
pub fn fetch_tool(
    feed: &dyn ReleaseFeed,
    source: &ToolSource,
    work_dir: &Path,
    emitter: &EventEmitter,
    trace_id: &str,
) -> Result<PathBuf, AppError> {
    let release = feed.latest_release(&source.owner, &source.repo, trace_id)?;
    let asset = release
        .asset_with_extension(source.kind.extension())
        .ok_or_else(|| {
            AppError::network(
                format!(
                    "Release {} of {}/{} has no .{} asset",
                    release.tag_name,
                    source.owner,
                    source.repo,
                    source.kind.extension()
                ),
                trace_id,
            )
        })?;
    let file_name = Path::new(&asset.name)
        .file_name()
        .map(|name| name.to_os_string())
        .ok_or_else(|| AppError::network(format!("Invalid asset name: {}", asset.name), trace_id))?;
    let destination = work_dir.join(file_name);

    let cached = fs::metadata(&destination)
        .map(|meta| meta.is_file() && meta.len() > 0 && (asset.size == 0 || meta.len() == asset.size))
        .unwrap_or(false);
    if cached {
        info!(trace_id = %trace_id, asset = %asset.name, "asset already downloaded");
        emitter(ServerEvent::DownloadingFile {
            name: asset.name.clone(),
            percentage: 100,
        });
        return Ok(destination);
    }

    let name = asset.name.clone();
    let progress = |percentage: u8| {
        emitter(ServerEvent::DownloadingFile {
            name: name.clone(),
            percentage,
        })
    };
    feed.download(&asset.browser_download_url, &destination, &progress, trace_id)?;
    Ok(destination)
}

pub fn update_files(
    state: &AppState,
    emitter: &EventEmitter,
    trace_id: &str,
) -> Result<(), AppError> {
    let permit = state
        .downloads
        .try_acquire()
        .ok_or_else(|| AppError::busy(DOWNLOAD_IN_PROGRESS, trace_id))?;

    let sources = tool_sources(&state.config, trace_id)?;
    let work_dir = state.config.work_dir();
    fs::create_dir_all(&work_dir)
        .map_err(|err| AppError::io("Failed to create work dir", err, trace_id))?;
    let cache_dir = state.config.cache_dir();
    if cache_dir.exists() {
        fs::remove_dir_all(&cache_dir)
            .map_err(|err| AppError::io("Failed to clear patcher cache", err, trace_id))?;
    }

    for source in &sources {
        let path = fetch_tool(state.feed.as_ref(), source, &work_dir, emitter, trace_id)?;
        let mut session = state.session();
        match source.kind {
            ToolKind::Cli => session.cli_jar = Some(path),
            ToolKind::Patches => session.patches_jar = Some(path),
            ToolKind::Integrations => session.integrations = Some(path),
            ToolKind::MicroG => session.microg = Some(path),
        }
    }

    check_prerequisites(state, emitter, trace_id)?;

    drop(permit);
    info!(trace_id = %trace_id, "update files finished");
    emitter(ServerEvent::Finished);
    Ok(())
}

pub fn check_for_updates(
    state: &AppState,
    emitter: &EventEmitter,
    trace_id: &str,
) -> Result<(), AppError> {
    let slug = &state.config.sources.builder;
    let (owner, repo) = parse_repo_slug(slug).ok_or_else(|| {
        AppError::validation(format!("Invalid builder repository: {slug}"), trace_id)
    })?;
    let builder_version = state.feed.latest_release(&owner, &repo, trace_id)?.tag_name;
    info!(
        trace_id = %trace_id,
        latest = %builder_version,
        current = CURRENT_VERSION,
        "version check"
    );

    if builder_version != CURRENT_VERSION {
        emitter(ServerEvent::NotUpToDate {
            builder_version,
            current_version: CURRENT_VERSION.to_string(),
        });
    } else {
        emitter(ServerEvent::UpToDate {
            current_version: CURRENT_VERSION.to_string(),
        });
    }
    Ok(())
}
