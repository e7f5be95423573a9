//! CLI command implementations.

mod auth;
mod catalog;
mod notifications;
mod watch;

pub use auth::{login, logout, register, whoami};
pub use catalog::{games, transactions};
pub use notifications::notifications;
pub use watch::watch;

use crate::output::{self, OutputFormat};
use topup_cli::ClientContext;

/// Returns false, after telling the user, when no session is stored.
fn require_login(context: &ClientContext, format: &OutputFormat) -> bool {
    if context.tokens.access_token().is_none() {
        output::print_error("Not logged in. Run 'topup login' first", format);
        return false;
    }
    true
}
