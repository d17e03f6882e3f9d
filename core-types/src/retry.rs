// Copyright (c) James Kassemi, SC, US. All rights reserved.
use std::time::Duration;
use tokio::time::sleep;

/// Fixed-delay retry policy for async operations.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Ladder used for archive HTTP fetches.
    pub fn default_http() -> Self {
        Self::new(5, Duration::from_secs(1))
    }

    pub async fn retry_async<F, Fut, T, E>(&self, mut op: F) -> Result<T, E>
    where
        F: FnMut(usize) -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        let mut attempt = 0;
        loop {
            match op(attempt).await {
                Ok(val) => return Ok(val),
                Err(err) => {
                    attempt += 1;
                    if attempt >= self.max_attempts {
                        return Err(err);
                    }
                    sleep(self.delay).await;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::default_http()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::time::{advance, pause};

    #[test]
    fn new_clamps_attempts() {
        let policy = RetryPolicy::new(0, Duration::from_millis(10));
        assert_eq!(policy.max_attempts, 1);
    }

    #[tokio::test]
    async fn retry_async_retries_until_success() {
        pause();
        let policy = RetryPolicy::new(3, Duration::from_millis(10));
        let attempts = Arc::new(AtomicUsize::new(0));
        let advancer = tokio::spawn(async {
            advance(Duration::from_millis(10)).await;
            advance(Duration::from_millis(10)).await;
        });

        let result: Result<&'static str, &str> = policy
            .retry_async(|attempt| {
                let attempts = attempts.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    if attempt < 2 {
                        Err("boom")
                    } else {
                        Ok("ok")
                    }
                }
            })
            .await;

        advancer.await.unwrap();
        assert_eq!(result.unwrap(), "ok");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_async_stops_after_max_attempts() {
        pause();
        let policy = RetryPolicy::new(5, Duration::from_secs(1));
        let attempts = Arc::new(AtomicUsize::new(0));
        let advancer = tokio::spawn(async {
            for _ in 0..4 {
                advance(Duration::from_secs(1)).await;
            }
        });

        let result: Result<(), &str> = policy
            .retry_async(|_| {
                let attempts = attempts.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err("nope")
                }
            })
            .await;

        advancer.await.unwrap();
        assert_eq!(result, Err("nope"));
        assert_eq!(attempts.load(Ordering::SeqCst), 5);
    }
}
