//! Logging initialization for the client binaries.

use std::path::PathBuf;

/// Initialize logging for the client.
///
/// Events go to stderr. When `TOPUP_LOG_FILE` is set they are also appended
/// to that file as JSONL.
pub fn init_logging(level: &str) {
    let log_path = std::env::var("TOPUP_LOG_FILE")
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
        .map(PathBuf::from);

    let config = observability::LogConfig {
        service_name: "topup".into(),
        default_level: level.into(),
        log_path: log_path.clone(),
        also_stderr: true,
    };

    if let Err(e) = observability::init_with_config(config) {
        // Fall back to stderr only; the file is optional.
        let _ = observability::init_with_config(observability::LogConfig {
            service_name: "topup".into(),
            default_level: level.into(),
            ..Default::default()
        });
        tracing::warn!(
            error = %e,
            log_path = ?log_path,
            "Could not open log file, logging to stderr only"
        );
    }
}
