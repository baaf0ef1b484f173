use std::num::NonZeroU32;

use governor::clock::{Clock, DefaultClock};
use governor::middleware::NoOpMiddleware;
use governor::state::keyed::DefaultKeyedStateStore;
use governor::Quota;

type KeyedLimiter<C> = governor::RateLimiter<
    String,
    DefaultKeyedStateStore<String>,
    C,
    NoOpMiddleware<<C as Clock>::Instant>,
>;

/// Per-session turn quota, replenished continuously over a minute.
/// A limit of zero disables limiting.
pub struct RateLimiter<C: Clock = DefaultClock> {
    limiter: Option<KeyedLimiter<C>>,
}

impl RateLimiter {
    pub fn new(per_minute: usize) -> Self {
        Self::with_clock(per_minute, DefaultClock::default())
    }
}

impl<C: Clock> RateLimiter<C> {
    pub fn with_clock(per_minute: usize, clock: C) -> Self {
        let limiter = NonZeroU32::new(u32::try_from(per_minute).unwrap_or(u32::MAX)).map(|n| {
            governor::RateLimiter::new(
                Quota::per_minute(n),
                DefaultKeyedStateStore::default(),
                clock,
            )
        });
        Self { limiter }
    }

    /// Takes one cell of `key`'s quota, or reports that none is left.
    pub fn allow(&self, key: &str) -> bool {
        let Some(limiter) = &self.limiter else {
            return true;
        };

        match limiter.check_key(&key.to_string()) {
            Ok(_) => true,
            Err(_) => {
                tracing::warn!(key, "rate limit exceeded");
                false
            }
        }
    }

    /// Drops keys whose quota has fully replenished.
    pub fn retain_recent(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.retain_recent();
            limiter.shrink_to_fit();
        }
    }

    pub fn len(&self) -> usize {
        self.limiter.as_ref().map_or(0, |l| l.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
