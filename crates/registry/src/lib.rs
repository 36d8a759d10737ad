//! Spec registry for the assembly open-data gateway.
//!
//! This crate turns an opaque service identifier into the endpoint path and
//! parameter contract the upstream API actually expects. It covers:
//!
//! - downloading spec documents ([`SpecDocumentFetcher`], [`HttpDocumentFetcher`])
//! - parsing their spreadsheet layout ([`SpecParser`])
//! - caching resolved specs in memory or on disk ([`SpecCache`])
//! - deduplicated, cache-first resolution ([`SpecResolver`])
//! - the optional service catalog ([`ServiceCatalog`])

pub mod cache;
pub mod catalog;
pub mod error;
pub mod fetcher;
pub mod markers;
pub mod parser;
pub mod resolver;
pub mod sheet;

pub use cache::{CACHE_SCHEMA_VERSION, CacheEntry, CachePolicy, FileSpecCache, MemorySpecCache, SpecCache};
pub use catalog::{CatalogEntry, CatalogError, ServiceCatalog};
pub use error::{CacheError, FetchError, ParseError, ResolutionError, SheetSection};
pub use fetcher::{HttpDocumentFetcher, SpecDocumentFetcher};
pub use markers::SheetMarkers;
pub use parser::SpecParser;
pub use resolver::{FailurePolicy, SpecResolver, SpecResolverBuilder};
pub use sheet::{SheetRows, decode_sheet};
