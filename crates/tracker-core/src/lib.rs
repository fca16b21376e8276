//! Ingestion pipeline of the chart tracker.
//!
//! A [`Worker`] consumes register and unregister [`Job`]s for one
//! repository. Register jobs retrieve the chart archive, parse it with
//! [`chart::load_archive`], enrich the resulting [`Package`] from the
//! chart annotations and hand it to the [`services::PackageManager`].

pub mod annotations;
pub mod chart;
pub mod error;
pub mod image_store;
pub mod license;
pub mod logo;
pub mod services;
pub mod types;
pub mod worker;

pub use error::{AnnotationError, BoxError, ChartError, ImageStoreError, LogoError, TrackerError};
pub use image_store::FsImageStore;
pub use license::KeywordLicenseDetector;
pub use services::{
    ErrorsCollector, ImageStore, LicenseDetector, MemoryErrorsCollector, PackageManager, Services,
};
pub use types::{ChartVersion, Job, JobKind, Metadata, Package, Repository};
pub use worker::{JobOutcome, JobStage, Worker, WorkerStats};
