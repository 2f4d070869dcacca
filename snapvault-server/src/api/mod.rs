//! HTTP API handlers for snapvault-server

pub mod analyze;
pub mod diagnostics;
pub mod extract;
pub mod health;
pub mod images;
pub mod upload;

pub use analyze::analyze_routes;
pub use diagnostics::{diagnostic_routes, Diagnostics};
pub use extract::{ApiJson, ApiQuery};
pub use health::health_routes;
pub use images::image_routes;
pub use upload::upload_routes;
