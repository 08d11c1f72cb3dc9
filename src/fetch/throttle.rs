use crate::config::RateLimit;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{self, Instant};
use tracing::trace;

/// Sliding-window limiter: at most `limit` admissions inside any `interval`.
///
/// Waiters queue on a fair mutex and the head of the queue sleeps while
/// holding it, so calls are admitted in submission order.
#[derive(Debug)]
pub struct Throttle {
    name: &'static str,
    limit: usize,
    interval: Duration,
    admitted: Mutex<VecDeque<Instant>>,
}

impl Throttle {
    pub fn new(name: &'static str, limit: usize, interval: Duration) -> Self {
        let limit = limit.max(1);
        Self {
            name,
            limit,
            interval,
            admitted: Mutex::new(VecDeque::with_capacity(limit)),
        }
    }

    pub fn from_rate(name: &'static str, rate: RateLimit) -> Self {
        Self::new(name, rate.limit, rate.interval())
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Suspends until the caller may issue one call.
    pub async fn acquire(&self) {
        let mut admitted = self.admitted.lock().await;

        loop {
            let now = Instant::now();
            while let Some(&oldest) = admitted.front() {
                if now.duration_since(oldest) >= self.interval {
                    admitted.pop_front();
                } else {
                    break;
                }
            }

            if admitted.len() < self.limit {
                admitted.push_back(now);
                return;
            }

            if let Some(&oldest) = admitted.front() {
                trace!(throttle = self.name, "waiting for a free slot");
                time::sleep_until(oldest + self.interval).await;
            }
        }
    }
}
