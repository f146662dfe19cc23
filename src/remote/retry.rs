use std::future::Future;

use rand::Rng;
use serde_json::json;
use tokio::time::{sleep, Duration};

use crate::config::Config;
use crate::error::RemoteResult;
use crate::logging::{log, obj, v_str, Domain, Level};

/// Doubling backoff for transient transport failures.
#[derive(Clone, Debug, PartialEq)]
pub struct Backoff {
    /// Extra attempts after the first one.
    pub retries: u32,
    pub first: Duration,
    pub ceiling: Duration,
    /// Each delay is scaled by a random factor in `1 ± spread`.
    pub spread: f64,
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::from_config(&Config::default())
    }
}

impl Backoff {
    pub fn from_config(cfg: &Config) -> Self {
        Backoff {
            retries: cfg.retry_max,
            first: Duration::from_millis(cfg.retry_base_ms),
            ceiling: Duration::from_millis(cfg.retry_max_delay_ms),
            spread: 0.3,
        }
    }

    fn nominal(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.first.saturating_mul(factor).min(self.ceiling)
    }

    fn delay(&self, attempt: u32) -> Duration {
        let nominal = self.nominal(attempt);
        if self.spread <= 0.0 {
            return nominal;
        }
        let scale = rand::thread_rng().gen_range(1.0 - self.spread..=1.0 + self.spread);
        nominal.mul_f64(scale.max(0.0))
    }
}

/// Runs `call` until it succeeds, fails with a non-retryable error, or the
/// retries are used up. Domain errors are never retried.
pub async fn with_backoff<F, Fut, T>(backoff: &Backoff, op: &str, mut call: F) -> RemoteResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = RemoteResult<T>>,
{
    let mut attempt = 0;
    loop {
        let err = match call().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        if attempt >= backoff.retries || !err.is_retryable() {
            return Err(err);
        }
        let wait = backoff.delay(attempt);
        log(
            Level::Warn,
            Domain::Remote,
            "retry",
            obj(&[
                ("op", v_str(op)),
                ("attempt", json!(attempt + 1)),
                ("of", json!(backoff.retries + 1)),
                ("wait_ms", json!(wait.as_millis() as u64)),
                ("msg", v_str(&err.to_string())),
            ]),
        );
        sleep(wait).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DomainError, RemoteError, TransportError};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn quick(retries: u32) -> Backoff {
        Backoff {
            retries,
            first: Duration::from_millis(1),
            ceiling: Duration::from_millis(4),
            spread: 0.0,
        }
    }

    #[test]
    fn test_nominal_delay_doubles_up_to_ceiling() {
        let b = Backoff {
            retries: 5,
            first: Duration::from_millis(50),
            ceiling: Duration::from_millis(300),
            spread: 0.0,
        };
        let delays: Vec<u64> = (0..5).map(|a| b.delay(a).as_millis() as u64).collect();
        assert_eq!(delays, vec![50, 100, 200, 300, 300]);
        assert_eq!(b.nominal(40), Duration::from_millis(300));
    }

    #[test]
    fn test_jitter_stays_within_spread() {
        let b = Backoff {
            spread: 0.5,
            ..Backoff::default()
        };
        for _ in 0..50 {
            let d = b.delay(0);
            assert!(d >= b.first.mul_f64(0.5) && d <= b.first.mul_f64(1.5), "{:?}", d);
        }
    }

    #[tokio::test]
    async fn test_unreachable_service_is_retried_until_it_answers() {
        let calls = AtomicU32::new(0);
        let result = with_backoff(&quick(3), "fetch_settings", || async {
            match calls.fetch_add(1, Ordering::SeqCst) {
                0 | 1 => Err(TransportError::Unreachable.into()),
                _ => Ok("settings"),
            }
        })
        .await;
        assert_eq!(result, Ok("settings"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_invalid_token_is_returned_at_once() {
        let calls = AtomicU32::new(0);
        let result: RemoteResult<()> = with_backoff(&quick(3), "change_settings", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(DomainError::InvalidToken.into())
        })
        .await;
        assert_eq!(result, Err(RemoteError::Domain(DomainError::InvalidToken)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_last_transport_error_surfaces_after_retries() {
        let calls = AtomicU32::new(0);
        let result: RemoteResult<()> = with_backoff(&quick(2), "fetch_evaluations", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(TransportError::from_status(503, "Service Unavailable", "").into())
        })
        .await;
        assert!(matches!(result, Err(RemoteError::Transport(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
