use crate::context::{channel_config, scheduler_config, ClientContext};
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use topup_notifications::{NotificationProjector, Toast};
use topup_realtime::{ChannelClient, Connector};
use topup_session::{RefreshDriver, TokenRefreshScheduler};
use tracing::info;

/// Token refresh, realtime channel and notification projection running
/// for as long as the session stays authenticated.
pub struct LiveSession {
    scheduler: Arc<TokenRefreshScheduler>,
    channel: ChannelClient,
    authenticated: watch::Receiver<bool>,
    toasts: mpsc::UnboundedReceiver<Toast>,
    tasks: Vec<JoinHandle<()>>,
}

impl LiveSession {
    pub fn start(context: &ClientContext, connector: Arc<dyn Connector>) -> Result<Self> {
        let session = context.session.clone();

        let driver: Arc<dyn RefreshDriver> = session.clone();
        let scheduler = Arc::new(TokenRefreshScheduler::new(
            driver,
            scheduler_config(&context.config),
        ));

        let channel = ChannelClient::new(
            channel_config(&context.config)?,
            context.tokens.clone(),
            connector,
        );
        channel.set_user_id(session.user().map(|user| user.id));

        let identity = channel.clone();
        session.set_state_callback(Box::new(move |change| {
            if change.state.is_authenticated() {
                identity.set_user_id(change.user_id);
            } else {
                identity.set_user_id(None);
            }
        }));

        let (toast_tx, toasts) = mpsc::unbounded_channel();
        let projector = NotificationProjector::new(context.notifications.clone());
        let events = channel.subscribe();

        let tasks = vec![
            scheduler.bind(session.authenticated()),
            channel.bind_auth_state(session.authenticated()),
            tokio::spawn(async move { projector.run(events, toast_tx).await }),
        ];
        info!("Live session started");

        Ok(Self {
            scheduler,
            channel,
            authenticated: session.authenticated(),
            toasts,
            tasks,
        })
    }

    pub fn channel(&self) -> &ChannelClient {
        &self.channel
    }

    pub fn scheduler(&self) -> &Arc<TokenRefreshScheduler> {
        &self.scheduler
    }

    /// Next toast, or `None` once the session is no longer authenticated.
    pub async fn next_toast(&mut self) -> Option<Toast> {
        loop {
            if !*self.authenticated.borrow_and_update() {
                return None;
            }
            tokio::select! {
                toast = self.toasts.recv() => return toast,
                changed = self.authenticated.changed() => {
                    if changed.is_err() {
                        return None;
                    }
                }
            }
        }
    }

    pub fn stop(self) {
        // Drop runs the teardown
    }
}

impl Drop for LiveSession {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
        self.channel.disconnect();
        self.scheduler.deactivate();
        info!("Live session stopped");
    }
}
