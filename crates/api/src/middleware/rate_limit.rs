//! Rate limiting middleware.
//!
//! Per-user token buckets backed by `governor`. Applied to contact listing.

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{
    clock::{Clock, DefaultClock},
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovRateLimiter,
};
use std::{
    collections::HashMap,
    num::NonZeroU32,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, RwLock,
    },
    time::{Duration, Instant},
};
use uuid::Uuid;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::CurrentUser;

/// Type alias for the rate limiter used per user.
type UserRateLimiter = GovRateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Idle limiters older than this are dropped by [`spawn_eviction_task`].
pub const LIMITER_IDLE_TIMEOUT: Duration = Duration::from_secs(600);

struct TrackedLimiter {
    limiter: UserRateLimiter,
    /// Milliseconds since `RateLimiterState::started` at the last check.
    last_seen_ms: AtomicU64,
}

/// Rate limiter state shared across all requests.
/// Holds one limiter per user id, created on first use and evicted once idle.
pub struct RateLimiterState {
    limiters: RwLock<HashMap<Uuid, Arc<TrackedLimiter>>>,
    quota: Quota,
    rate_limit_per_minute: u32,
    started: Instant,
}

impl RateLimiterState {
    /// Returns `None` when `rate_limit_per_minute` is 0 (limiting disabled).
    pub fn new(rate_limit_per_minute: u32) -> Option<Self> {
        let per_minute = NonZeroU32::new(rate_limit_per_minute)?;
        Some(Self {
            limiters: RwLock::new(HashMap::new()),
            quota: Quota::per_minute(per_minute),
            rate_limit_per_minute,
            started: Instant::now(),
        })
    }

    pub fn limit(&self) -> u32 {
        self.rate_limit_per_minute
    }

    fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    fn get_or_create_limiter(&self, user_id: Uuid) -> Arc<TrackedLimiter> {
        {
            let limiters = self.limiters.read().unwrap_or_else(|e| e.into_inner());
            if let Some(limiter) = limiters.get(&user_id) {
                return limiter.clone();
            }
        }

        let mut limiters = self.limiters.write().unwrap_or_else(|e| e.into_inner());
        limiters
            .entry(user_id)
            .or_insert_with(|| {
                Arc::new(TrackedLimiter {
                    limiter: GovRateLimiter::direct(self.quota),
                    last_seen_ms: AtomicU64::new(self.elapsed_ms()),
                })
            })
            .clone()
    }

    /// Ok if the request may proceed, otherwise the seconds until it may retry.
    pub fn check(&self, user_id: Uuid) -> Result<(), u64> {
        let tracked = self.get_or_create_limiter(user_id);
        tracked
            .last_seen_ms
            .fetch_max(self.elapsed_ms(), Ordering::Relaxed);

        match tracked.limiter.check() {
            Ok(_) => Ok(()),
            Err(not_until) => {
                let wait_time = not_until.wait_time_from(DefaultClock::default().now());
                Err(wait_time.as_secs().max(1))
            }
        }
    }

    /// Drops limiters not checked within `idle`. Returns how many were removed.
    ///
    /// A dropped user starts again with a full bucket, so `idle` should be at
    /// least the quota's replenish window.
    pub fn evict_idle(&self, idle: Duration) -> usize {
        let now = self.elapsed_ms();
        let idle_ms = u64::try_from(idle.as_millis()).unwrap_or(u64::MAX);

        let mut limiters = self.limiters.write().unwrap_or_else(|e| e.into_inner());
        let before = limiters.len();
        limiters.retain(|_, tracked| {
            now.saturating_sub(tracked.last_seen_ms.load(Ordering::Relaxed)) < idle_ms
        });
        before - limiters.len()
    }

    pub fn active_limiters(&self) -> usize {
        self.limiters
            .read()
            .map(|limiters| limiters.len())
            .unwrap_or(0)
    }
}

impl std::fmt::Debug for RateLimiterState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiterState")
            .field("rate_limit_per_minute", &self.rate_limit_per_minute)
            .field("active_limiters", &self.active_limiters())
            .finish()
    }
}

/// Periodically evicts limiters idle for longer than `idle`.
pub fn spawn_eviction_task(
    state: Arc<RateLimiterState>,
    period: Duration,
    idle: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let evicted = state.evict_idle(idle);
            if evicted > 0 {
                tracing::debug!(
                    evicted,
                    remaining = state.active_limiters(),
                    "Evicted idle rate limiters"
                );
            }
        }
    })
}

/// Middleware that rate limits per authenticated user.
///
/// Must run after `require_user_auth` so [`CurrentUser`] is in extensions.
pub async fn contacts_rate_limit(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let Some(limiter) = state.rate_limiter.as_ref() else {
        return next.run(req).await;
    };
    let Some(CurrentUser(user)) = req.extensions().get::<CurrentUser>() else {
        return next.run(req).await;
    };

    if let Err(retry_after) = limiter.check(user.id) {
        metrics::counter!("rate_limited_requests_total").increment(1);
        tracing::info!(user_id = %user.id, retry_after, "Rate limit exceeded");
        return ApiError::RateLimited {
            limit: limiter.limit(),
            retry_after,
        }
        .into_response();
    }

    next.run(req).await
}
