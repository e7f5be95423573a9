//! Stored notification commands.

use crate::output::{self, OutputFormat};
use anyhow::Result;
use topup_cli::ClientContext;

pub fn notifications(
    context: &ClientContext,
    mark_read: bool,
    clear: bool,
    format: &OutputFormat,
) -> Result<()> {
    let store = &context.notifications;

    if clear {
        store.clear_all()?;
        output::print_success("Notifications cleared", format);
        return Ok(());
    }
    if mark_read {
        store.mark_all_as_read()?;
        output::print_success("All notifications marked as read", format);
        return Ok(());
    }

    let notifications = store.notifications();
    if format.is_json() {
        output::print_json(&notifications);
        return Ok(());
    }

    output::print_heading(&format!(
        "Notifications ({} unread)",
        store.unread_count()
    ));
    if notifications.is_empty() {
        println!("  No notifications");
    }
    for notification in &notifications {
        let marker = if notification.read { " " } else { "*" };
        println!(
            "{} {}  {}: {}",
            marker, notification.created_at, notification.title, notification.message
        );
    }
    Ok(())
}
