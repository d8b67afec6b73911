use std::{
    env,
    future::Future,
    sync::OnceLock,
    time::{Duration, Instant},
};

use tracing::{Instrument, Span};

const DEBUG_DELAY_ENV: &str = "TABLEMATE_DEBUG_REMOTE_DELAY_MS";

/// Runs one backend call inside `span`, logging how long it took and whether
/// it failed. Honors the debug delay so overlapping requests can be provoked
/// by hand.
pub async fn send_remote_request<F, Fut, T, E>(span: Span, send: F) -> Result<T, E>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    async move {
        debug_remote_delay().await;
        let started = Instant::now();
        let result = send().await;
        let elapsed_ms = started.elapsed().as_millis();
        match &result {
            Ok(_) => tracing::trace!(elapsed_ms, "remote request ok"),
            Err(err) => tracing::debug!(elapsed_ms, error = %err, "remote request failed"),
        }
        result
    }
    .instrument(span)
    .await
}

async fn debug_remote_delay() {
    if let Some(delay) = debug_remote_delay_duration() {
        tracing::trace!(delay_ms = delay.as_millis(), "Applying debug remote delay");
        tokio::time::sleep(delay).await;
    }
}

fn debug_remote_delay_duration() -> Option<Duration> {
    static DELAY: OnceLock<Option<Duration>> = OnceLock::new();
    *DELAY.get_or_init(|| parse_delay(env::var(DEBUG_DELAY_ENV).ok().as_deref()))
}

fn parse_delay(raw: Option<&str>) -> Option<Duration> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    match raw.parse::<u64>() {
        Ok(0) => None,
        Ok(ms) => Some(Duration::from_millis(ms)),
        Err(_) => {
            tracing::warn!(
                env = DEBUG_DELAY_ENV,
                value = %raw,
                "Invalid remote debug delay"
            );
            None
        }
    }
}
