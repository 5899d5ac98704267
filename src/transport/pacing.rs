//! Token bucket pacing of outgoing requests.
//!
//! The gateway rejects clients sending more than 50 messages per second with error 100. A
//! [RequestPacer] admits at most `burst` requests at once and refills at `per_second`, so any one
//! second window carries at most `burst + per_second` requests.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

pub(crate) struct RequestPacer {
    refill_rate: f64,
    max_tokens: f64,
    bucket: Mutex<Option<TokenBucket>>,
}

struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl RequestPacer {
    pub fn new(per_second: u32, burst: u32) -> RequestPacer {
        RequestPacer {
            refill_rate: per_second.max(1) as f64,
            max_tokens: burst.max(1) as f64,
            bucket: Mutex::new(None),
        }
    }

    /// Waits until another request may be sent.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut guard = self.bucket.lock().await;
                let now = Instant::now();
                let bucket = guard.get_or_insert_with(|| TokenBucket {
                    tokens: self.max_tokens,
                    last_refill: now,
                });

                let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
                bucket.tokens = (bucket.tokens + elapsed * self.refill_rate).min(self.max_tokens);
                bucket.last_refill = now;

                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    return;
                }
                Duration::from_secs_f64((1.0 - bucket.tokens) / self.refill_rate)
            };
            sleep(wait).await;
        }
    }
}
