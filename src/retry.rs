//! The retry controller (C4): bounded exponential backoff with jitter,
//! classifying errors as transient (retry) or terminal (abort).

use crate::control::ControlSurface;
use crate::error::{LoaderError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// An upper bound on the total time spent retrying, across all
    /// attempts. `None` means only `max_attempts` bounds the loop.
    pub cumulative_bound: Option<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            cumulative_bound: None,
        }
    }
}

pub struct RetryController {
    config: RetryConfig,
}

impl RetryController {
    pub fn new(config: RetryConfig) -> Self {
        RetryController { config }
    }

    /// Run `attempt` up to `max_attempts` times. Transient errors are
    /// retried with exponential backoff and jitter; terminal errors
    /// abort immediately. A `shutdown` signal cancels a pending sleep
    /// and reports `LoaderError::Runtime("shutdown")`.
    pub async fn run<T, F, Fut>(
        &self,
        control: &ControlSurface,
        mut shutdown: watch::Receiver<bool>,
        mut attempt: F,
    ) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut backoff = self.config.initial_backoff;
        let mut cumulative = Duration::ZERO;

        for n in 1..=self.config.max_attempts {
            control.increment_attempt();
            match attempt(n).await {
                Ok(value) => {
                    if n > 1 {
                        info!("succeeded after {} attempts", n);
                    }
                    return Ok(value);
                }
                Err(e) if e.is_transient() && n < self.config.max_attempts => {
                    if let Some(bound) = self.config.cumulative_bound {
                        if cumulative >= bound {
                            warn!("cumulative retry bound exceeded after {} attempts", n);
                            return Err(e);
                        }
                    }
                    let jittered = jitter(backoff);
                    warn!(attempt = n, backoff = ?jittered, error = %e, "transient failure, retrying");

                    tokio::select! {
                        _ = tokio::time::sleep(jittered) => {}
                        _ = shutdown.changed() => {
                            return Err(LoaderError::runtime("shutdown"));
                        }
                    }

                    cumulative += jittered;
                    backoff = (backoff * 2).min(self.config.max_backoff);
                }
                Err(e) => return Err(e),
            }
        }
        unreachable!("loop always returns within max_attempts iterations")
    }
}

fn jitter(base: Duration) -> Duration {
    let millis = base.as_millis() as u64;
    if millis == 0 {
        return base;
    }
    let jittered = rand::random::<u64>() % millis.max(1);
    Duration::from_millis(millis / 2 + jittered / 2)
}
