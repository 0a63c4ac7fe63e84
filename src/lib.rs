pub mod app;

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use app::commands::resolve_trace_id;
use app::config::{config_path, load_config, save_config};
use app::error::AppError;
use app::feed::GithubFeed;
use app::logging::init_logging;
use app::platform::HostPlatform;
use app::process::SystemProcessKiller;
use app::state::AppState;
use app::sync::CURRENT_VERSION;

pub fn run() -> Result<(), AppError> {
    let trace_id = resolve_trace_id(None);
    let config = load_config(&trace_id)?;
    init_logging(&config.logging.log_level);

    if !config_path().exists() {
        match save_config(&config, &trace_id) {
            Ok(()) => info!(path = %config_path().display(), "wrote default config"),
            Err(err) => warn!(trace_id = %trace_id, error = %err, "failed to write default config"),
        }
    }

    let platform = HostPlatform::detect();
    let feed = GithubFeed::new(Duration::from_secs(
        config.tools.download_timeout.max(1) as u64,
    ))?;
    let address = config.server.bind_address();
    info!(
        trace_id = %trace_id,
        version = CURRENT_VERSION,
        platform = ?platform,
        address = %address,
        "starting fz-builder"
    );

    let state = Arc::new(AppState::new(
        config,
        platform,
        Arc::new(feed),
        Arc::new(SystemProcessKiller),
    ));
    app::server::bind(&address, state)?.run()
}
