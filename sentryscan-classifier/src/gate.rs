//! Rate-limited batching gate: model scoring is serialized through it so
//! calls stay within a configured window. The gate only bounds the *rate*
//! at which this process issues scoring calls; from a caller's
//! perspective, going through it is still a synchronous blocking call.

use std::sync::Mutex;
use std::time::{Duration, Instant};

pub struct RateLimitedGate {
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl RateLimitedGate {
    pub fn new(min_interval: Duration) -> Self {
        Self { min_interval, last_call: Mutex::new(None) }
    }

    /// Blocks the calling thread until at least `min_interval` has elapsed
    /// since the previous call returned, then records this call's start.
    /// Every caller serializes through the same mutex, so only one thread
    /// is ever inside the model-scoring window at a time.
    pub fn acquire(&self) {
        let mut last = self.last_call.lock().expect("gate mutex poisoned");
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                std::thread::sleep(self.min_interval - elapsed);
            }
        }
        *last = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn back_to_back_calls_are_spaced_by_at_least_the_window() {
        let gate = RateLimitedGate::new(Duration::from_millis(20));
        let start = Instant::now();
        gate.acquire();
        gate.acquire();
        assert!(start.elapsed() >= Duration::from_millis(20));
    }
}
