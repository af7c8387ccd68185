//! API 路由模块

mod config;
mod generation;
mod health;
mod preferences;

pub use config::config_routes;
pub use generation::generation_routes;
pub use health::health_routes;
pub use preferences::preferences_routes;

use axum::Router;

use crate::state::AppState;
use std::sync::Arc;

/// 创建所有 API 路由
pub fn create_api_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(health_routes())
        .merge(config_routes())
        .merge(preferences_routes())
        .merge(generation_routes())
        .with_state(state)
}
