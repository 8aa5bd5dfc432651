//! Visitor analytics: event ingestion with daily rollups, and reporting
//!
//! Visitor addresses are reduced to keyed digests before anything is
//! written; see [`digest`].

pub mod browser;
pub mod digest;
pub mod ingest;
pub mod ip_extractor;
pub mod report;

pub use browser::BrowserFamily;
pub use digest::IpHasher;
pub use ingest::{IngestError, IngestService};
pub use ip_extractor::resolve_client_address;
pub use report::{AnalyticsReport, ReportError, ReportService};
