use std::{process::ExitCode, sync::atomic::AtomicU64};

mod config;
mod consts;
mod core;
mod diagnostics;
mod gate;
mod resolver;
mod secret;
mod settings;

pub(crate) use crate::consts::{
    BACKOFF_EXPONENT_CAP, BACKOFF_MAX_SECS, FETCH_TIMEOUT_SECS, KEYRING_SERVICE,
    SETTINGS_DIR_NAME, SETTINGS_FILE_NAME,
};
pub(crate) use crate::core::{debug_log, truncate_message, unique_time_suffix, unix_now_secs};

use crate::{
    config::GateConfig,
    gate::{AccessGate, GateStatus},
    resolver::HttpResolver,
    secret::KeyringSecretStore,
    settings::JsonSettingsStore,
};

/// Monotonic counter for generating unique temp-file suffixes.
pub(crate) static FILE_SUFFIX_COUNTER: AtomicU64 = AtomicU64::new(0);

type ProductionGate = AccessGate<KeyringSecretStore, JsonSettingsStore, HttpResolver>;

#[tokio::main]
async fn main() -> ExitCode {
    let gate = match build_gate() {
        Ok(gate) => gate,
        Err(error) => {
            eprintln!("access-gate: {error}");
            return ExitCode::FAILURE;
        }
    };

    let mut status_rx = gate.subscribe();
    gate.begin_access();

    // Headless shell: block until the gate settles, print the authorized
    // destination (or nothing on fallback), and report how it went via the
    // exit code. The resolution loop retries transport failures forever, so
    // this may legitimately wait as long as the network is down.
    let outcome = loop {
        let status = status_rx.borrow_and_update().clone();
        match status {
            GateStatus::Authorized { destination, .. } => {
                println!("{destination}");
                break ExitCode::SUCCESS;
            }
            GateStatus::Fallback => {
                debug_log("no destination authorized; local experience applies");
                break ExitCode::from(2);
            }
            GateStatus::Idle | GateStatus::Validating => {}
        }
        if status_rx.changed().await.is_err() {
            break ExitCode::FAILURE;
        }
    };

    log_final_diagnostics(&gate);
    outcome
}

fn build_gate() -> Result<ProductionGate, String> {
    let settings = JsonSettingsStore::open_default()?;
    let resolver = HttpResolver::new()?;
    Ok(AccessGate::new(
        GateConfig::default(),
        KeyringSecretStore::new(),
        settings,
        resolver,
    ))
}

fn log_final_diagnostics(gate: &ProductionGate) {
    match gate.diagnostics() {
        Ok(diagnostics) => match serde_json::to_string(&diagnostics) {
            Ok(json) => debug_log(&format!("final diagnostics: {json}")),
            Err(error) => debug_log(&format!("failed to serialize diagnostics: {error}")),
        },
        Err(error) => debug_log(&format!("failed to snapshot gate: {error}")),
    }
}
