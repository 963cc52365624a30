//! Reservoir rate limiting for index writes
//!
//! Each write takes one token from a reservoir of `capacity`. An empty
//! reservoir waits for the next refill, which resets it to full. A semaphore
//! caps writes in flight.

use anyhow::Result;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Semaphore, SemaphorePermit};

struct Reservoir {
    tokens: usize,
    last_refill: Instant,
}

pub struct ReservoirLimiter {
    capacity: usize,
    refill_interval: Duration,
    reservoir: Mutex<Reservoir>,
    in_flight: Semaphore,
}

impl ReservoirLimiter {
    pub fn new(capacity: usize, refill_interval: Duration, max_concurrent: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            refill_interval,
            reservoir: Mutex::new(Reservoir {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
            in_flight: Semaphore::new(max_concurrent.max(1)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Wait for a token and an in-flight slot; the slot frees on drop
    pub async fn acquire(&self) -> Result<SemaphorePermit<'_>> {
        loop {
            let wait = {
                let mut reservoir = self.reservoir.lock().await;
                let elapsed = reservoir.last_refill.elapsed();
                if elapsed >= self.refill_interval {
                    reservoir.tokens = self.capacity;
                    reservoir.last_refill = Instant::now();
                }
                if reservoir.tokens > 0 {
                    reservoir.tokens -= 1;
                    None
                } else {
                    Some(self.refill_interval.saturating_sub(elapsed))
                }
            };

            match wait {
                None => break,
                Some(wait) => {
                    tracing::debug!("Write reservoir empty, waiting {:?}", wait);
                    tokio::time::sleep(wait).await;
                }
            }
        }

        self.in_flight
            .acquire()
            .await
            .map_err(|e| anyhow::anyhow!("Write limiter closed: {}", e))
    }

    /// Tokens left before the next refill
    pub async fn available(&self) -> usize {
        self.reservoir.lock().await.tokens
    }
}
