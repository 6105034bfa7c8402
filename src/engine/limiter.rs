// src/engine/limiter.rs
// =============================================================================
// Per-service token buckets shared by every worker of a batch.
//
// - acquire(service) waits until a token is available, spends it and returns
//   a Permit; dropping (or releasing) the permit ends the in-flight request
// - pause(service, d) blocks every acquirer of that service for d, used when
//   the service tells us when its budget resets
//
// Tokens are only spent under the bucket's lock, so the balance can't go
// negative and no token is handed out twice.
// =============================================================================

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

/// A remote service with its own request budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Service {
    GitHub,
    Dns,
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GitHub => write!(f, "github"),
            Self::Dns => write!(f, "dns"),
        }
    }
}

/// Bucket shape: `capacity` requests of burst, one new token every `refill_every`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateBudget {
    pub capacity: u32,
    pub refill_every: Duration,
}

impl RateBudget {
    /// 60 requests per hour, the unauthenticated GitHub REST ceiling.
    pub const GITHUB_ANONYMOUS: Self = Self {
        capacity: 60,
        refill_every: Duration::from_secs(60),
    };

    /// 5000 requests per hour, the GitHub REST ceiling with a token.
    pub const GITHUB_AUTHENTICATED: Self = Self {
        capacity: 5000,
        refill_every: Duration::from_millis(720),
    };

    /// Local politeness limit for the system resolver.
    pub const DNS: Self = Self {
        capacity: 50,
        refill_every: Duration::from_millis(20),
    };

    pub fn github(authenticated: bool) -> Self {
        if authenticated {
            Self::GITHUB_AUTHENTICATED
        } else {
            Self::GITHUB_ANONYMOUS
        }
    }
}

struct Bucket {
    budget: RateBudget,
    tokens: u32,
    last_refill: Instant,
    paused_until: Option<Instant>,
}

impl Bucket {
    fn new(budget: RateBudget) -> Self {
        Self {
            budget,
            tokens: budget.capacity,
            last_refill: Instant::now(),
            paused_until: None,
        }
    }

    fn refill(&mut self, now: Instant) {
        let period = self.budget.refill_every;
        if period.is_zero() {
            self.tokens = self.budget.capacity;
            self.last_refill = now;
            return;
        }

        let elapsed = now.saturating_duration_since(self.last_refill);
        let earned = elapsed.as_nanos() / period.as_nanos();
        if earned == 0 {
            return;
        }

        let earned = u32::try_from(earned).unwrap_or(u32::MAX);
        self.tokens = self.tokens.saturating_add(earned).min(self.budget.capacity);
        if self.tokens == self.budget.capacity {
            self.last_refill = now;
        } else {
            self.last_refill += period * earned;
        }
    }

    // Spends a token, or says when to come back
    fn try_take(&mut self, now: Instant) -> Result<(), Instant> {
        if let Some(until) = self.paused_until {
            if now < until {
                return Err(until);
            }
            self.paused_until = None;
        }

        self.refill(now);
        if self.tokens > 0 {
            self.tokens -= 1;
            Ok(())
        } else {
            Err(self.last_refill + self.budget.refill_every)
        }
    }
}

struct Lane {
    bucket: Mutex<Bucket>,
    in_flight: Arc<AtomicUsize>,
}

/// Proof that a request to `service` was budgeted.
#[derive(Debug)]
#[must_use = "dropping a permit immediately ends the request it budgets"]
pub struct Permit {
    service: Service,
    in_flight: Arc<AtomicUsize>,
}

impl Permit {
    pub fn service(&self) -> Service {
        self.service
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct RateLimiter {
    lanes: HashMap<Service, Lane>,
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("services", &self.lanes.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl RateLimiter {
    pub fn new(budgets: impl IntoIterator<Item = (Service, RateBudget)>) -> Self {
        let lanes = budgets
            .into_iter()
            .map(|(service, budget)| {
                let lane = Lane {
                    bucket: Mutex::new(Bucket::new(budget)),
                    in_flight: Arc::new(AtomicUsize::new(0)),
                };
                (service, lane)
            })
            .collect();
        Self { lanes }
    }

    /// Default budgets; the GitHub one depends on whether a token is configured.
    pub fn for_services(github_authenticated: bool) -> Self {
        Self::new([
            (Service::GitHub, RateBudget::github(github_authenticated)),
            (Service::Dns, RateBudget::DNS),
        ])
    }

    /// Waits for a token for `service`.
    ///
    /// Services without a configured budget are not limited.
    pub async fn acquire(&self, service: Service) -> Permit {
        let Some(lane) = self.lanes.get(&service) else {
            return Permit {
                service,
                in_flight: Arc::new(AtomicUsize::new(1)),
            };
        };

        loop {
            let wait_until = {
                let mut bucket = lane.bucket.lock().await;
                match bucket.try_take(Instant::now()) {
                    Ok(()) => break,
                    Err(until) => until,
                }
            };
            let wait = wait_until.saturating_duration_since(Instant::now());
            debug!(%service, wait_ms = wait.as_millis() as u64, "rate budget exhausted, waiting");
            sleep_until(wait_until).await;
        }

        lane.in_flight.fetch_add(1, Ordering::SeqCst);
        Permit {
            service,
            in_flight: Arc::clone(&lane.in_flight),
        }
    }

    pub fn release(&self, permit: Permit) {
        drop(permit);
    }

    /// Holds every acquirer of `service` for `duration`.
    ///
    /// A shorter pause never cuts an existing longer one short.
    pub async fn pause(&self, service: Service, duration: Duration) {
        let Some(lane) = self.lanes.get(&service) else {
            return;
        };
        let until = Instant::now() + duration;
        let mut bucket = lane.bucket.lock().await;
        if bucket.paused_until.map_or(true, |current| current < until) {
            warn!(%service, pause_secs = duration.as_secs(), "remote service is throttling, pausing requests");
            bucket.paused_until = Some(until);
        }
    }

    /// Requests currently holding a permit for `service`.
    pub fn in_flight(&self, service: Service) -> usize {
        self.lanes
            .get(&service)
            .map_or(0, |lane| lane.in_flight.load(Ordering::SeqCst))
    }

    /// Tokens left right now, after refilling.
    pub async fn remaining(&self, service: Service) -> Option<u32> {
        let lane = self.lanes.get(&service)?;
        let mut bucket = lane.bucket.lock().await;
        bucket.refill(Instant::now());
        Some(bucket.tokens)
    }
}

// -----------------------------------------------------------------------------
// BEGINNER NOTES:
//
// 1. What is a token bucket?
//    - The bucket starts full (capacity tokens)
//    - Every request spends one token; tokens trickle back at a fixed rate
//    - Bursts up to `capacity` go through at once, the long-run rate stays
//      at one request per `refill_every`
//
// 2. Why tokio::sync::Mutex for the bucket?
//    - Many workers call acquire() at the same time
//    - The tokio mutex can be awaited without blocking the runtime thread
//
// 3. What does impl Drop for Permit do?
//    - drop() runs automatically when the permit goes out of scope
//    - The in-flight counter can't leak even if a lookup is cancelled
//      halfway through
// -----------------------------------------------------------------------------
