//! Production adapters for the ports.

mod http_fetch;
mod http_store;
mod zip_extract;

pub use http_fetch::HttpFetcher;
pub use http_store::HttpObjectStore;
pub use zip_extract::ZipExtractor;
