//! Downstream notification of completed graph-build jobs.
//!
//! The annotation service consumes a job's output directory once the job is
//! selected. [`AnnotationNotifier`] is the seam the pipeline talks to;
//! [`HttpAnnotationNotifier`] is the production implementation.

pub mod annotation;
pub mod traits;

pub use annotation::HttpAnnotationNotifier;
pub use traits::{AnnotationNotifier, NotifyError};
