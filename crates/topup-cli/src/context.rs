use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::task::JoinHandle;
use topup_api::ApiClient;
use topup_config::{Config, Paths};
use topup_notifications::NotificationStore;
use topup_realtime::ChannelConfig;
use topup_session::{SchedulerConfig, SessionManager};
use topup_storage::{FileStorage, KeyValueStorage, TokenStore};
use tracing::debug;

/// Long-lived client services sharing one token store.
pub struct ClientContext {
    pub config: Config,
    pub tokens: Arc<TokenStore>,
    pub api: Arc<ApiClient>,
    pub session: Arc<SessionManager>,
    pub notifications: Arc<NotificationStore>,
    invalidation: JoinHandle<()>,
}

impl ClientContext {
    /// Open the durable session file under `paths` and build the services.
    ///
    /// Must be called inside a tokio runtime.
    pub fn open(paths: &Paths, config: Config) -> Result<Self> {
        paths.ensure_dirs()?;
        let storage = FileStorage::open(paths.session_file()).with_context(|| {
            format!(
                "Failed to open session storage at {}",
                paths.session_file().display()
            )
        })?;
        Self::with_storage(Arc::new(storage), config)
    }

    /// Build the services over any key-value storage.
    pub fn with_storage(storage: Arc<dyn KeyValueStorage>, config: Config) -> Result<Self> {
        let tokens = Arc::new(TokenStore::new(storage.clone()));
        let api = Arc::new(ApiClient::new(config.api_base_url.clone(), tokens.clone()));
        let session = Arc::new(SessionManager::new(api.clone()));
        let invalidation = session.spawn_invalidation_listener();
        let notifications = Arc::new(
            NotificationStore::open(storage).context("Failed to load notifications")?,
        );
        debug!(api = %config.api_base_url, "Client context ready");

        Ok(Self {
            config,
            tokens,
            api,
            session,
            notifications,
            invalidation,
        })
    }
}

impl Drop for ClientContext {
    fn drop(&mut self) {
        self.invalidation.abort();
    }
}

pub fn scheduler_config(config: &Config) -> SchedulerConfig {
    SchedulerConfig {
        check_interval: config.refresh.check_interval(),
        proactive_interval: config.refresh.proactive_interval(),
        expiry_lead: config.refresh.expiry_lead(),
    }
}

pub fn channel_config(config: &Config) -> Result<ChannelConfig> {
    let settings = &config.realtime;
    let mut channel = ChannelConfig::new(config.ws_url()?);
    channel.auto_reconnect = settings.auto_reconnect;
    channel.reconnect_interval = settings.reconnect_interval();
    channel.max_reconnect_attempts = settings.max_reconnect_attempts;
    channel.exponential_backoff = settings.exponential_backoff;
    channel.max_reconnect_delay = settings.max_reconnect_delay();
    Ok(channel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_channel_config_follows_settings() {
        let mut config = Config::default();
        config.realtime.exponential_backoff = true;
        config.realtime.max_reconnect_attempts = 3;

        let channel = channel_config(&config).unwrap();
        assert_eq!(channel.url.as_str(), "ws://localhost:8080/ws");
        assert!(channel.exponential_backoff);
        assert_eq!(channel.max_reconnect_attempts, 3);
        assert_eq!(channel.reconnect_interval, Duration::from_millis(5000));
        assert_eq!(channel.max_reconnect_delay, Duration::from_secs(30));
    }

    #[test]
    fn test_scheduler_config_follows_settings() {
        let mut config = Config::default();
        config.refresh.check_interval_secs = 5;
        let scheduler = scheduler_config(&config);
        assert_eq!(scheduler.check_interval, Duration::from_secs(5));
        assert_eq!(scheduler.proactive_interval, Duration::from_secs(840));
        assert_eq!(scheduler.expiry_lead, Duration::from_secs(300));
    }

    #[tokio::test]
    async fn test_open_creates_session_file_dir() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().join("home"));
        let context = ClientContext::open(&paths, Config::default()).unwrap();
        assert!(!context.session.is_authenticated());
        assert!(paths.base_dir().is_dir());
    }
}
