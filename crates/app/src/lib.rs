//! Application wiring for stockbook: settings, store selection and the action boundary.

pub mod actions;
pub mod services;
pub mod settings;

pub use actions::{ActionResult, Actions, DeletedCount, ErrorCode};
pub use services::{AppServices, AppStockbook, ChangeFeed, build_services};
pub use settings::{Settings, StoreKind};
