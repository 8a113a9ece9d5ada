pub mod cache;
pub mod config;
pub mod error;
pub mod logging;
pub mod provider;
pub mod store;

#[cfg(test)]
pub mod test_helpers;

pub use cache::{CacheEntry, ProviderCache};
pub use config::Settings;
pub use error::{Error, Result};
