//! Live session command.

use crate::output::{self, OutputFormat};
use anyhow::Result;
use serde_json::json;
use std::sync::Arc;
use topup_cli::{ClientContext, LiveSession};
use topup_notifications::{Toast, ToastLevel};
use topup_realtime::TungsteniteConnector;

/// Keep the session refreshed and print live notifications until Ctrl-C or
/// until the session ends.
pub async fn watch(context: &ClientContext, format: &OutputFormat) -> Result<()> {
    if !super::require_login(context, format) {
        return Ok(());
    }
    if !context.session.check_auth().await? {
        output::print_error("Session expired. Please login again", format);
        return Ok(());
    }

    let mut live = LiveSession::start(context, Arc::new(TungsteniteConnector))?;
    if !format.is_json() {
        println!("Watching for notifications. Press Ctrl-C to stop.");
    }

    loop {
        tokio::select! {
            toast = live.next_toast() => match toast {
                Some(toast) => print_toast(&toast, format),
                None => {
                    output::print_error("Session ended. Please login again", format);
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    drop(live);
    Ok(())
}

fn print_toast(toast: &Toast, format: &OutputFormat) {
    let level = match toast.level {
        ToastLevel::Success => "success",
        ToastLevel::Info => "info",
        ToastLevel::Warning => "warning",
        ToastLevel::Error => "error",
    };
    if format.is_json() {
        println!(
            "{}",
            json!({"level": level, "title": toast.title, "description": toast.description})
        );
    } else {
        println!("[{}] {}: {}", level.to_uppercase(), toast.title, toast.description);
    }
}
