//! Catalog records and the client that fetches them.

mod client;
mod models;

pub use client::{parse_catalog_url, CatalogApiClient, CatalogClient, CatalogError};
pub use models::*;
