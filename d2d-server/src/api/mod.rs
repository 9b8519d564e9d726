//! HTTP API handlers for d2d-server

pub mod collection;
pub mod health;
pub mod submission;
pub mod ui;

pub use collection::get_collection_data;
pub use health::health_routes;
pub use submission::submit_cleaning_data;
pub use ui::ui_routes;
