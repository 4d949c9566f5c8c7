pub mod config;
pub mod fetcher;
pub mod platforms;
pub mod registry;

pub use config::SourceEndpoints;
pub use fetcher::ReqwestFetcher;
pub use platforms::{HttpSource, Page, PlatformApi};
pub use registry::build_registry;
