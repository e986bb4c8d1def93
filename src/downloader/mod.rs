//! Track download: source resolution, delivery, naming and tagging.

pub mod cover;
pub mod delivery;
pub mod naming;
pub mod pipeline;
pub mod progress;
pub mod resolver;

pub use cover::CoverClient;
pub use delivery::{AcquisitionError, DeliveryClient, DEFAULT_DELIVERY_URL};
pub use naming::{FilenameFormat, NamingOptions};
pub use pipeline::{
    AcquisitionOutcome, DownloadRequest, PipelineError, TrackDownloader, DEFAULT_QUALITY,
};
pub use resolver::{ResolveError, SourceResolver, DEFAULT_CATALOG_TRACK_BASE, DEFAULT_LINK_LOOKUP_URL};
