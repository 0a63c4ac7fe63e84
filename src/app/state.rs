use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::app::adb::locator::resolve_program;
use crate::app::config::BuilderConfig;
use crate::app::feed::ReleaseFeed;
use crate::app::guard::DownloadGate;
use crate::app::models::ServerEvent;
use crate::app::platform::HostPlatform;
use crate::app::process::ProcessKiller;
use crate::app::session::Session;

/// Sink for events bound to one client connection.
pub type EventEmitter = Arc<dyn Fn(ServerEvent) + Send + Sync>;

pub struct AppState {
    pub config: BuilderConfig,
    pub platform: HostPlatform,
    pub session: Mutex<Session>,
    pub downloads: DownloadGate,
    pub feed: Arc<dyn ReleaseFeed>,
    pub killer: Arc<dyn ProcessKiller>,
}

impl AppState {
    pub fn new(
        config: BuilderConfig,
        platform: HostPlatform,
        feed: Arc<dyn ReleaseFeed>,
        killer: Arc<dyn ProcessKiller>,
    ) -> Self {
        Self {
            config,
            platform,
            session: Mutex::new(Session::new()),
            downloads: DownloadGate::new(),
            feed,
            killer,
        }
    }

    /// A poisoned lock still holds usable session data.
    pub fn session(&self) -> MutexGuard<'_, Session> {
        self.session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn session_snapshot(&self) -> Session {
        self.session().clone()
    }

    pub fn java_program(&self) -> String {
        resolve_program(&self.config.tools.java_command, "java")
    }

    pub fn adb_program(&self) -> String {
        resolve_program(&self.config.tools.adb_command, "adb")
    }

    pub fn su_program(&self) -> String {
        resolve_program(&self.config.tools.su_command, "su")
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.config.tools.command_timeout.max(1) as u64)
    }

    pub fn install_timeout(&self) -> Duration {
        Duration::from_secs(self.config.tools.install_timeout.max(1) as u64)
    }
}
