//! Collaborators the job handler talks to.
//!
//! Each frontend provides its own implementations; they are shared by every
//! worker of the process and must be safe for concurrent use.

use std::sync::{Arc, Mutex};

use tracker_dl::Retriever;

use crate::{
    error::{BoxError, ImageStoreError},
    types::Package,
};

/// Persistent package registry.
///
/// Registering an already known name+version+repository replaces it.
pub trait PackageManager: Send + Sync {
    fn register(&self, package: &Package) -> Result<(), BoxError>;
    fn unregister(&self, package: &Package) -> Result<(), BoxError>;
}

pub trait ImageStore: Send + Sync {
    /// Stores an image and returns its id.
    fn save_image(&self, data: &[u8]) -> Result<String, ImageStoreError>;
}

pub trait LicenseDetector: Send + Sync {
    /// SPDX identifier of the license text, or an empty string.
    fn detect(&self, data: &[u8]) -> String;
}

/// Sink for job errors reported to operators.
pub trait ErrorsCollector: Send + Sync {
    fn append(&self, repository_id: &str, message: String);
}

/// Error collector that stores all errors for inspection.
#[derive(Default)]
pub struct MemoryErrorsCollector {
    errors: Mutex<Vec<(String, String)>>,
}

impl MemoryErrorsCollector {
    /// Collected `(repository_id, message)` pairs, in arrival order.
    pub fn errors(&self) -> Vec<(String, String)> {
        self.errors
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.errors.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ErrorsCollector for MemoryErrorsCollector {
    fn append(&self, repository_id: &str, message: String) {
        self.errors
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((repository_id.to_string(), message));
    }
}

/// Everything a worker needs besides its repository.
pub struct Services {
    pub retriever: Retriever,
    pub pm: Arc<dyn PackageManager>,
    pub is: Arc<dyn ImageStore>,
    pub ld: Arc<dyn LicenseDetector>,
    pub ec: Arc<dyn ErrorsCollector>,
}
