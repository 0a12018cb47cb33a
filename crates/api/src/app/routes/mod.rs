use axum::Router;

pub mod customers;
pub mod orders;
pub mod system;

mod reprocess;

pub fn router() -> Router {
    Router::new()
        .nest("/customers", customers::router())
        .nest("/orders", orders::router())
}
