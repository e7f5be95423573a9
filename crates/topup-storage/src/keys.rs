//! Storage key constants.

/// Keys under which client state is persisted.
pub struct StorageKeys;

impl StorageKeys {
    /// Access token
    pub const ACCESS_TOKEN: &'static str = "access_token";

    /// Refresh token
    pub const REFRESH_TOKEN: &'static str = "refresh_token";

    /// Authenticated user and session flag (JSON)
    pub const SESSION_SUMMARY: &'static str = "auth-storage";

    /// Most recent notifications (JSON)
    pub const NOTIFICATIONS: &'static str = "notification-storage";
}
