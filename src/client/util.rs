use std::future::Future;
use std::time::Duration;

pub trait Timeout: Sized {
  fn timeout(self, duration: Duration) -> tokio::time::Timeout<Self>;
}

impl<F> Timeout for F
where
  F: Future,
{
  fn timeout(self, duration: Duration) -> tokio::time::Timeout<Self> {
    tokio::time::timeout(duration, self)
  }
}

/// Reconnect backoff configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Backoff {
  /// The maximum number of reconnect attempts to make. `None` retries forever.
  pub max_tries: Option<u64>,

  /// Before attempting the first reconnect, wait this long.
  pub initial_delay: Duration,

  /// After each failed attempt, the delay is multiplied by this value.
  pub delay_multiplier: u32,

  /// The maximum delay to wait in between attempts.
  pub max_delay: Duration,
}

/// The default reconnect backoff.
pub const DEFAULT_BACKOFF: Backoff = Backoff {
  max_tries: Some(8),
  initial_delay: Duration::from_secs(1),
  delay_multiplier: 3,
  max_delay: Duration::from_secs(12),
};

impl Default for Backoff {
  fn default() -> Self {
    DEFAULT_BACKOFF
  }
}

impl Backoff {
  /// The delay to wait before each attempt.
  pub fn delays(&self) -> impl Iterator<Item = Duration> {
    let Backoff {
      max_tries,
      initial_delay,
      delay_multiplier,
      max_delay,
    } = *self;
    let delays = std::iter::successors(Some(initial_delay.min(max_delay)), move |delay| {
      Some(delay.saturating_mul(delay_multiplier).min(max_delay))
    });
    delays.take(max_tries.map_or(usize::MAX, |n| n as usize))
  }
}
