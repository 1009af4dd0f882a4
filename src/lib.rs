pub mod config;
pub mod device;
pub mod errors;
pub mod locator;

pub use errors::{TapScoutError, TapScoutResult};
pub use locator::engine::Locator;
pub use locator::types::{FindOptions, FindResult, Selector};
