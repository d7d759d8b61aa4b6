//! Logging service

use crate::models::{ItemRef, LogLevel, Principal};

/// Initialize logging with the specified level
///
/// `RUST_LOG` takes precedence over the configured level when set.
pub fn init_logging(level: LogLevel) -> Result<(), Box<dyn std::error::Error>> {
    let default_filter = match level {
        LogLevel::Error => "itemflow=error,itemflow_core=error",
        LogLevel::Warn => "itemflow=warn,itemflow_core=warn",
        LogLevel::Info => "itemflow=info,itemflow_core=info",
        LogLevel::Debug => "itemflow=debug,itemflow_core=debug",
        LogLevel::Trace => "itemflow=trace,itemflow_core=trace",
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| e as Box<dyn std::error::Error>)?;

    Ok(())
}

/// Audit line for a realized state transition
pub fn log_transition(
    workflow_id: &str,
    item: &ItemRef,
    from_state: Option<&str>,
    to_state: &str,
    principal: &Principal,
) {
    tracing::info!(
        target: "itemflow::audit",
        workflow = workflow_id,
        item = %item,
        from_state = from_state.unwrap_or(""),
        to_state = to_state,
        user = %principal,
        "Workflow state changed"
    );
}

/// Log an access decision that denied a right
pub fn log_security_event(event_type: &str, item: &ItemRef, user: &Principal, details: &str) {
    tracing::warn!(
        event_type = event_type,
        item = %item,
        user = %user,
        details = details,
        "Security event"
    );
}

/// Log a system error
pub fn log_error(error: &str, context: Option<&str>) {
    tracing::error!(
        error = error,
        context = context.unwrap_or(""),
        "System error occurred"
    );
}
