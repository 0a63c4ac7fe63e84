use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;

use tracing::{debug, info};

use crate::app::error::AppError;
use crate::app::models::ReleaseInfo;

pub const GITHUB_API_BASE: &str = "https://api.github.com";

/// Source of release metadata and release assets.
pub trait ReleaseFeed: Send + Sync {
    fn latest_release(&self, owner: &str, repo: &str, trace_id: &str)
        -> Result<ReleaseInfo, AppError>;

    /// Downloads `url` to `destination`, reporting whole-percent progress.
    /// Returns the number of bytes written.
    fn download(
        &self,
        url: &str,
        destination: &Path,
        progress: &dyn Fn(u8),
        trace_id: &str,
    ) -> Result<u64, AppError>;
}

pub struct GithubFeed {
    client: reqwest::blocking::Client,
    api_base: String,
}

impl GithubFeed {
    pub fn new(timeout: Duration) -> Result<Self, AppError> {
        Self::with_api_base(GITHUB_API_BASE, timeout)
    }

    pub fn with_api_base(api_base: &str, timeout: Duration) -> Result<Self, AppError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("fz-builder/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|err| AppError::system(format!("Failed to build HTTP client: {err}"), ""))?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
        })
    }
}

pub fn progress_percent(done: u64, total: Option<u64>) -> Option<u8> {
    let total = total.filter(|t| *t > 0)?;
    Some(((done.min(total) * 100) / total) as u8)
}

impl ReleaseFeed for GithubFeed {
    fn latest_release(
        &self,
        owner: &str,
        repo: &str,
        trace_id: &str,
    ) -> Result<ReleaseInfo, AppError> {
        let url = format!("{}/repos/{owner}/{repo}/releases/latest", self.api_base);
        debug!(trace_id = %trace_id, url = %url, "fetch latest release");
        let response = self
            .client
            .get(&url)
            .header("Accept", "application/vnd.github+json")
            .send()
            .and_then(|response| response.error_for_status())
            .map_err(|err| {
                AppError::network(format!("Failed to query {owner}/{repo}: {err}"), trace_id)
            })?;
        response.json::<ReleaseInfo>().map_err(|err| {
            AppError::network(
                format!("Invalid release payload for {owner}/{repo}: {err}"),
                trace_id,
            )
        })
    }

    fn download(
        &self,
        url: &str,
        destination: &Path,
        progress: &dyn Fn(u8),
        trace_id: &str,
    ) -> Result<u64, AppError> {
        let mut response = self
            .client
            .get(url)
            .send()
            .and_then(|response| response.error_for_status())
            .map_err(|err| AppError::network(format!("Failed to download {url}: {err}"), trace_id))?;
        let total = response.content_length();

        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)
                .map_err(|err| AppError::io("Failed to create download dir", err, trace_id))?;
        }
        // Interrupted downloads never land under the final name.
        let partial = destination.with_extension("part");
        let mut file = File::create(&partial)
            .map_err(|err| AppError::io("Failed to create download file", err, trace_id))?;

        let mut written = 0u64;
        let mut last_percent = None;
        let mut buffer = [0u8; 64 * 1024];
        loop {
            let count = response
                .read(&mut buffer)
                .map_err(|err| AppError::network(format!("Download interrupted: {err}"), trace_id))?;
            if count == 0 {
                break;
            }
            file.write_all(&buffer[..count])
                .map_err(|err| AppError::io("Failed to write download", err, trace_id))?;
            written += count as u64;
            let percent = progress_percent(written, total);
            if percent.is_some() && percent != last_percent {
                last_percent = percent;
                if let Some(value) = percent {
                    progress(value);
                }
            }
        }
        file.flush()
            .map_err(|err| AppError::io("Failed to flush download", err, trace_id))?;
        drop(file);
        fs::rename(&partial, destination)
            .map_err(|err| AppError::io("Failed to finalize download", err, trace_id))?;
        if last_percent != Some(100) {
            progress(100);
        }
        info!(trace_id = %trace_id, url = %url, bytes = written, "downloaded");
        Ok(written)
    }
}
