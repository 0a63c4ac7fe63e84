use std::path::{Path, PathBuf};

use crate::app::config::BuilderConfig;
use crate::app::error::AppError;
use crate::app::platform::HostPlatform;
use crate::app::session::Session;

/// File the patcher writes before it is renamed to the session output name.
pub const RAW_OUTPUT_NAME: &str = "patched.apk";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildInvocation {
    pub program: String,
    pub args: Vec<String>,
}

impl BuildInvocation {
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

pub fn input_apk_path(work_dir: &Path, package_name: &str) -> PathBuf {
    work_dir.join(format!("{package_name}.apk"))
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

fn required<'a>(value: Option<&'a PathBuf>, what: &str, trace_id: &str) -> Result<&'a PathBuf, AppError> {
    value.ok_or_else(|| {
        AppError::validation(
            format!("{what} is not downloaded yet. Please update files first."),
            trace_id,
        )
    })
}

/// `-jar <cli> -b <patches> -t <cache> --experimental -a <input> -o <output>`
/// followed by the optional aapt2 and integrations flags and the patch args.
pub fn build_invocation(
    config: &BuilderConfig,
    platform: HostPlatform,
    java_program: &str,
    session: &Session,
    trace_id: &str,
) -> Result<BuildInvocation, AppError> {
    let package_name = session
        .package_name()
        .ok_or_else(|| AppError::validation("No app selected", trace_id))?;
    let cli = required(session.cli_jar.as_ref(), "Patcher CLI", trace_id)?;
    let patches = required(session.patches_jar.as_ref(), "Patches bundle", trace_id)?;

    let work_dir = config.work_dir();
    let mut args = vec![
        "-jar".to_string(),
        path_arg(cli),
        "-b".to_string(),
        path_arg(patches),
        "-t".to_string(),
        path_arg(&config.cache_dir()),
        "--experimental".to_string(),
        "-a".to_string(),
        path_arg(&input_apk_path(&work_dir, package_name)),
        "-o".to_string(),
        path_arg(&work_dir.join(RAW_OUTPUT_NAME)),
    ];

    if platform.is_android() {
        args.push("--custom-aapt2-binary".to_string());
        args.push(path_arg(&work_dir.join("aapt2")));
    }

    if session.use_integrations {
        let integrations = required(session.integrations.as_ref(), "Integrations", trace_id)?;
        args.push("-m".to_string());
        args.push(path_arg(integrations));
    }

    // Entries may hold several space separated flags.
    args.extend(
        session
            .patches
            .iter()
            .flat_map(|entry| entry.split_whitespace())
            .map(str::to_string),
    );

    Ok(BuildInvocation {
        program: java_program.to_string(),
        args,
    })
}
