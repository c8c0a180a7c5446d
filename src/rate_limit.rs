//! Per-job fetch admission: a token bucket of capacity one.
//!
//! Tokens refill at the job's hit rate and are never stockpiled beyond one,
//! so a job can never burst past its budget. Acquisition is a cancellable
//! channel receive: pause and stop wake a blocked acquirer without handing
//! it a token.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquire {
    Token,
    Cancelled,
}

pub struct RateLimiter {
    tokens: tokio::sync::Mutex<mpsc::Receiver<()>>,
    refill: tokio::task::JoinHandle<()>,
}

impl RateLimiter {
    /// Build a limiter admitting `hit_rate` fetches per second.
    pub fn new(hit_rate: f64) -> Self {
        let (tx, rx) = mpsc::channel(1);
        let period = Duration::from_secs_f64(1.0 / hit_rate);

        let refill = tokio::spawn(async move {
            let mut tick = interval(period);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                // a token already banked is dropped, not stacked
                let _ = tx.try_send(());
                if tx.is_closed() {
                    break;
                }
            }
        });

        Self {
            tokens: tokio::sync::Mutex::new(rx),
            refill,
        }
    }

    /// Wait for the next token. Returns `Cancelled` without consuming one
    /// when `cancel` fires first; dropping the future mid-wait consumes
    /// nothing either.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Acquire {
        let mut tokens = self.tokens.lock().await;
        tokio::select! {
            _ = cancel.cancelled() => Acquire::Cancelled,
            received = tokens.recv() => match received {
                Some(()) => Acquire::Token,
                None => Acquire::Cancelled,
            },
        }
    }
}

impl Drop for RateLimiter {
    fn drop(&mut self) {
        self.refill.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_token_is_immediate() {
        let limiter = RateLimiter::new(1000.0);
        let cancel = CancellationToken::new();
        assert_eq!(limiter.acquire(&cancel).await, Acquire::Token);
    }

    #[tokio::test]
    async fn test_cancel_wakes_blocked_acquirer() {
        let limiter = RateLimiter::new(0.1); // one token every 10s
        let cancel = CancellationToken::new();

        // drain the initial token
        assert_eq!(limiter.acquire(&cancel).await, Acquire::Token);

        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel_clone.cancel();
        });

        assert_eq!(limiter.acquire(&cancel).await, Acquire::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokens_do_not_stockpile() {
        let limiter = RateLimiter::new(10.0);
        let cancel = CancellationToken::new();

        // plenty of refill periods elapse while nobody is listening
        tokio::time::sleep(Duration::from_secs(5)).await;

        // exactly one banked token is available at once
        assert_eq!(limiter.acquire(&cancel).await, Acquire::Token);
        let second = tokio::time::timeout(Duration::from_millis(10), async {
            limiter.acquire(&cancel).await
        })
        .await;
        assert!(second.is_err(), "no burst beyond the single banked token");
    }
}
