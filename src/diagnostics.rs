use serde::Serialize;

use crate::{
    gate::{GateRuntime, GateStatus},
    unix_now_secs,
};

/// Point-in-time view of the gate for logging and for any shell that wants
/// to show resolution progress.
#[derive(Debug, Serialize, Clone)]
pub(crate) struct GateDiagnostics {
    pub(crate) status: String,
    pub(crate) resolving: bool,
    pub(crate) attempts: u64,
    pub(crate) backoff_seconds: u64,
    pub(crate) last_attempt_at: Option<u64>,
    pub(crate) stale_for_seconds: Option<u64>,
    pub(crate) last_error: Option<String>,
}

impl GateDiagnostics {
    pub(crate) fn capture(status: &GateStatus, runtime: &GateRuntime) -> Self {
        let now = unix_now_secs();
        let stale_for_seconds = runtime.last_attempt_at.map(|at| now.saturating_sub(at));

        Self {
            status: status.label().to_string(),
            resolving: runtime.resolving,
            attempts: runtime.attempts,
            backoff_seconds: runtime.backoff_seconds,
            last_attempt_at: runtime.last_attempt_at,
            stale_for_seconds,
            last_error: runtime.last_error.clone(),
        }
    }
}
