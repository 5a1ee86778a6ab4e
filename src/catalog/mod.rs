//! Image-source acquisition: catalog-ID lookup against the seller's JSON
//! command endpoint, and URL-to-blob image fetching with relay fallback.

pub mod client;
pub mod fetch;

pub use client::{parse_localized, CatalogClient, CatalogDetail, CatalogError, CatalogListItem};
pub use fetch::{FetchError, ImageFetcher};
