//! Application wiring for the top-up client.
//!
//! [`ClientContext`] assembles storage, the REST client and the session
//! manager from a [`Config`](topup_config::Config). [`LiveSession`] adds the
//! long-running parts: proactive token refresh, the realtime channel and
//! the notification projector, all following the authenticated flag.

mod context;
mod live;

pub use context::{channel_config, scheduler_config, ClientContext};
pub use live::LiveSession;
