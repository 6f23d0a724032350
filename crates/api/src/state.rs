use irm_engine::{RateLimiter, SourceRegistry};
use irm_store::Store;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub registry: SourceRegistry,
    pub limiter: Arc<RateLimiter>,
}
