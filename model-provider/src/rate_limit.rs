//! Local rate-limit admission
//!
//! Keeps a rolling one-minute window of request timestamps and estimated
//! token counts per provider and delays an attempt until it fits the
//! provider's `requests_per_minute`/`tokens_per_minute`. Best effort: the
//! server remains the authority.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use solace_config::RateLimitConfig;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep};
use tracing::info;

const WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Default)]
struct Window {
  /// Admitted requests, oldest first
  entries: VecDeque<(Instant, u32)>,
}

impl Window {
  fn prune(&mut self, now: Instant) {
    while let Some(&(at, _)) = self.entries.front() {
      if now.duration_since(at) < WINDOW {
        break;
      }
      self.entries.pop_front();
    }
  }

  /// How long until a request of `tokens` fits; zero when it fits now
  fn wait_time(&self, now: Instant, limits: &RateLimitConfig, tokens: u32) -> Duration {
    let until_expired = |index: usize| {
      self
        .entries
        .get(index)
        .map_or(Duration::ZERO, |&(at, _)| (at + WINDOW).saturating_duration_since(now))
    };

    let mut wait = Duration::ZERO;

    if let Some(rpm) = limits.requests_per_minute.filter(|rpm| *rpm > 0) {
      let rpm = rpm as usize;
      if self.entries.len() >= rpm {
        wait = wait.max(until_expired(self.entries.len() - rpm));
      }
    }

    if let Some(tpm) = limits.tokens_per_minute.filter(|tpm| *tpm > 0) {
      let mut used: u64 = self.entries.iter().map(|&(_, t)| u64::from(t)).sum();
      let wanted = u64::from(tokens);
      let mut index = 0;
      // A request larger than the whole budget waits for an empty window
      while used + wanted > u64::from(tpm) && index < self.entries.len() {
        used -= u64::from(self.entries[index].1);
        index += 1;
      }
      if index > 0 {
        wait = wait.max(until_expired(index - 1));
      }
    }

    wait
  }
}

/// Per-provider admission control shared by every in-flight request
#[derive(Debug, Clone, Default)]
pub struct RateLimiter {
  windows: Arc<Mutex<HashMap<String, Arc<Mutex<Window>>>>>,
}

impl RateLimiter {
  pub fn new() -> Self {
    Self::default()
  }

  /// Waits until a request of `estimated_tokens` is admitted, then records
  /// it. Returns the time spent waiting.
  pub async fn admit(
    &self,
    provider_id: &str,
    limits: &RateLimitConfig,
    estimated_tokens: u32,
  ) -> Duration {
    if limits.requests_per_minute.is_none() && limits.tokens_per_minute.is_none() {
      return Duration::ZERO;
    }

    let window = {
      let mut windows = self.windows.lock().await;
      Arc::clone(windows.entry(provider_id.to_string()).or_default())
    };

    // Held across the sleep so waiters for one provider queue in order
    let mut window = window.lock().await;
    let started = Instant::now();
    loop {
      let now = Instant::now();
      window.prune(now);
      let wait = window.wait_time(now, limits, estimated_tokens);
      if wait.is_zero() {
        window.entries.push_back((now, estimated_tokens));
        return now.duration_since(started);
      }
      info!(
        provider = provider_id,
        wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
        "rate limit reached, delaying request"
      );
      sleep(wait).await;
    }
  }
}
