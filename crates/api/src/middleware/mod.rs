//! HTTP middleware components.

pub mod logging;
pub mod metrics;
pub mod rate_limit;
pub mod trace_id;
pub mod user_auth;

pub use metrics::{init_metrics, metrics_handler, metrics_middleware};
pub use rate_limit::{
    contacts_rate_limit, spawn_eviction_task, RateLimiterState, LIMITER_IDLE_TIMEOUT,
};
pub use trace_id::{trace_id, RequestId, REQUEST_ID_HEADER};
pub use user_auth::require_user_auth;
