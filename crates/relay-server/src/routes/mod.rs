// Export route modules
pub mod flight;
pub mod slack;
pub mod status;

#[cfg(test)]
pub mod testing;

use crate::state::AppState;
use axum::Router;

// Function to configure all routes
pub fn configure(state: AppState) -> Router {
    Router::new()
        .merge(status::routes())
        .merge(flight::routes(state.clone()))
        .merge(unit_tests::routes(state.clone()))
        .merge(slack::routes(state))
}
