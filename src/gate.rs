use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use reqwest::Url;
use tokio::sync::watch;

use crate::{
    config::GateConfig,
    core::redact_control_url,
    debug_log,
    diagnostics::GateDiagnostics,
    resolver::{build_control_url, ResolverClient},
    secret::SecretStore,
    settings::SettingsStore,
    truncate_message, unix_now_secs, BACKOFF_EXPONENT_CAP, BACKOFF_MAX_SECS,
};

/// What the gate has decided so far. Replaced wholesale on every transition;
/// `Authorized` and `Fallback` are terminal for the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum GateStatus {
    Idle,
    Validating,
    Authorized { token: String, destination: Url },
    Fallback,
}

impl GateStatus {
    pub(crate) fn label(&self) -> &'static str {
        match self {
            GateStatus::Idle => "Idle",
            GateStatus::Validating => "Validating",
            GateStatus::Authorized { .. } => "Authorized",
            GateStatus::Fallback => "Fallback",
        }
    }

    pub(crate) fn is_terminal(&self) -> bool {
        matches!(self, GateStatus::Authorized { .. } | GateStatus::Fallback)
    }
}

#[derive(Default)]
pub(crate) struct GateRuntime {
    /// True while a resolution task is in flight. Set before the task is
    /// spawned so a second `begin_access` on the same tick cannot race past
    /// the guard.
    pub(crate) resolving: bool,
    pub(crate) stop_tx: Option<watch::Sender<bool>>,
    pub(crate) attempts: u64,
    pub(crate) backoff_seconds: u64,
    pub(crate) last_attempt_at: Option<u64>,
    pub(crate) last_error: Option<String>,
}

/// Decides, once per session, whether the shell may load a remote destination
/// or must fall back to the local experience. Single writer of `GateStatus`;
/// any number of observers via `subscribe`. Cloning yields another handle to
/// the same gate.
pub(crate) struct AccessGate<S, P, R> {
    inner: Arc<GateInner<S, P, R>>,
}

impl<S, P, R> Clone for AccessGate<S, P, R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct GateInner<S, P, R> {
    config: GateConfig,
    secret: S,
    settings: P,
    resolver: R,
    status_tx: watch::Sender<GateStatus>,
    status_rx: watch::Receiver<GateStatus>,
    runtime: Mutex<GateRuntime>,
}

impl<S, P, R> AccessGate<S, P, R>
where
    S: SecretStore + 'static,
    P: SettingsStore + 'static,
    R: ResolverClient + 'static,
{
    pub(crate) fn new(config: GateConfig, secret: S, settings: P, resolver: R) -> Self {
        let (status_tx, status_rx) = watch::channel(GateStatus::Idle);
        Self {
            inner: Arc::new(GateInner {
                config,
                secret,
                settings,
                resolver,
                status_tx,
                status_rx,
                runtime: Mutex::new(GateRuntime::default()),
            }),
        }
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<GateStatus> {
        self.inner.status_rx.clone()
    }

    pub(crate) fn status(&self) -> GateStatus {
        self.inner.status_rx.borrow().clone()
    }

    /// Entry point. With a valid cached credential this settles synchronously
    /// to `Authorized` without touching the network; otherwise it spawns the
    /// resolution loop. Never surfaces an error, and never starts a second
    /// loop while one is in flight.
    pub(crate) fn begin_access(&self) {
        if self.status().is_terminal() {
            debug_log("begin_access: already settled for this session");
            return;
        }

        if let Some((token, destination)) = self.inner.cached_access() {
            debug_log("begin_access: cached credential valid, no resolution needed");
            self.inner
                .publish(GateStatus::Authorized { token, destination });
            return;
        }

        let stop_rx = {
            let mut runtime = match self.inner.runtime.lock() {
                Ok(runtime) => runtime,
                Err(_) => {
                    debug_log("begin_access: runtime lock poisoned");
                    return;
                }
            };
            if runtime.resolving {
                debug_log("begin_access: resolution already in flight");
                return;
            }
            let (stop_tx, stop_rx) = watch::channel(false);
            runtime.resolving = true;
            runtime.stop_tx = Some(stop_tx);
            runtime.attempts = 0;
            runtime.backoff_seconds = 0;
            runtime.last_error = None;
            stop_rx
        };

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            inner.run_resolution_loop(stop_rx).await;
        });
    }

    /// Stops an in-flight resolution loop between attempts. The status is
    /// left wherever it was; no terminal state is published.
    pub(crate) fn cancel(&self) {
        if let Ok(mut runtime) = self.inner.runtime.lock() {
            if let Some(stop_tx) = runtime.stop_tx.take() {
                let _ = stop_tx.send(true);
            }
        }
    }

    pub(crate) fn diagnostics(&self) -> Result<GateDiagnostics, String> {
        let runtime = self
            .inner
            .runtime
            .lock()
            .map_err(|_| "Runtime lock poisoned".to_string())?;
        Ok(GateDiagnostics::capture(&self.status(), &runtime))
    }
}

impl<S, P, R> GateInner<S, P, R>
where
    S: SecretStore + 'static,
    P: SettingsStore + 'static,
    R: ResolverClient + 'static,
{
    /// The cached pair counts only when the destination still parses and the
    /// stored token matches the expected validation token. A stale pair is
    /// ignored, not deleted.
    fn cached_access(&self) -> Option<(String, Url)> {
        let destination = self.settings.get(&self.config.cached_url_key)?;
        let destination = Url::parse(&destination).ok()?;
        let token = match self.secret.retrieve(&self.config.cached_token_key) {
            Ok(Some(token)) => token,
            Ok(None) => return None,
            Err(error) => {
                debug_log(&format!("cached token unavailable: {error}"));
                return None;
            }
        };
        (token == self.config.validation_token).then_some((token, destination))
    }

    async fn run_resolution_loop(self: Arc<Self>, mut stop_rx: watch::Receiver<bool>) {
        self.publish(GateStatus::Validating);

        let control_url = match build_control_url(&self.config) {
            Ok(url) => url,
            Err(error) => {
                debug_log(&format!("resolution aborted, bad control URL: {error}"));
                self.publish(GateStatus::Fallback);
                self.finish_loop();
                return;
            }
        };
        debug_log(&format!("resolving via {}", redact_control_url(&control_url)));

        let mut attempt: u32 = 0;
        loop {
            if *stop_rx.borrow() {
                debug_log("resolution cancelled");
                break;
            }

            attempt += 1;
            self.mark_attempt();
            match self.resolver.fetch_text(&control_url).await {
                Ok(body) => {
                    self.settle(&body);
                    break;
                }
                Err(error) => {
                    let delay = backoff_delay_secs(attempt);
                    debug_log(&format!(
                        "resolution attempt {attempt} failed: {}; retrying in {delay}s",
                        truncate_message(&error, 200)
                    ));
                    self.mark_backoff(&error, delay);
                    tokio::select! {
                        changed = stop_rx.changed() => {
                            if changed.is_err() || *stop_rx.borrow() {
                                debug_log("resolution cancelled during backoff");
                                break;
                            }
                        }
                        _ = tokio::time::sleep(Duration::from_secs(delay)) => {}
                    }
                }
            }
        }

        self.finish_loop();
    }

    /// One successful fetch settles the session: a valid payload is persisted
    /// and authorizes; anything else is a terminal fallback with no store
    /// writes. Transport is no longer involved, so nothing here retries.
    fn settle(&self, body: &str) {
        match parse_payload(body, &self.config.validation_token) {
            Some((token, destination)) => {
                if let Err(error) = self
                    .settings
                    .set(&self.config.cached_url_key, destination.as_str())
                {
                    debug_log(&format!("failed to cache destination: {error}"));
                }
                if let Err(error) = self.secret.store(&self.config.cached_token_key, &token) {
                    debug_log(&format!("failed to cache validation token: {error}"));
                }
                self.publish(GateStatus::Authorized { token, destination });
            }
            None => {
                debug_log(&format!(
                    "resolver response rejected: {}",
                    truncate_message(body.trim(), 140)
                ));
                self.publish(GateStatus::Fallback);
            }
        }
    }

    fn publish(&self, status: GateStatus) {
        debug_log(&format!("gate status -> {}", status.label()));
        self.status_tx.send_replace(status);
    }

    fn mark_attempt(&self) {
        if let Ok(mut runtime) = self.runtime.lock() {
            runtime.attempts = runtime.attempts.saturating_add(1);
            runtime.last_attempt_at = Some(unix_now_secs());
        }
    }

    fn mark_backoff(&self, error: &str, delay_secs: u64) {
        if let Ok(mut runtime) = self.runtime.lock() {
            runtime.last_error = Some(truncate_message(error, 300));
            runtime.backoff_seconds = delay_secs;
        }
    }

    fn finish_loop(&self) {
        if let Ok(mut runtime) = self.runtime.lock() {
            runtime.resolving = false;
            runtime.stop_tx = None;
            runtime.backoff_seconds = 0;
        }
    }
}

/// A trusted payload is exactly `<validation token>#<destination URL>` after
/// trimming. Anything else means no access is granted.
pub(crate) fn parse_payload(body: &str, expected_token: &str) -> Option<(String, Url)> {
    let parts: Vec<&str> = body.trim().split('#').collect();
    if parts.len() != 2 || parts[0] != expected_token {
        return None;
    }
    let destination = Url::parse(parts[1]).ok()?;
    Some((parts[0].to_string(), destination))
}

pub(crate) fn backoff_delay_secs(attempt: u32) -> u64 {
    (1u64 << attempt.min(BACKOFF_EXPONENT_CAP)).min(BACKOFF_MAX_SECS)
}
