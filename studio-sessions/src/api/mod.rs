//! HTTP API handlers for studio-sessions

pub mod auth;
pub mod cancellation;
pub mod clients;
pub mod extract;
pub mod health;
pub mod sessions;

pub use auth::{auth_middleware, Principal};
pub use cancellation::{
    admin_cancelled, cancel_session, cancel_warning, charge_cancellation, client_package_price,
};
pub use clients::{
    client_pricing, create_package, create_user, get_user, grant_package, list_packages,
};
pub use health::health_routes;
pub use sessions::{
    book_session, complete_session, confirm_session, create_session, get_session, list_sessions,
    request_session,
};
