//! affect-core — Identity matching and emotion analytics.
//!
//! Consumes descriptors and expression vectors produced by external
//! inference; never touches images. The matcher and aggregator are pure
//! functions over borrowed snapshots of the store and sample log.

pub mod analytics;
pub mod emotion;
pub mod error;
pub mod records;
pub mod samples;
pub mod store;
pub mod types;

pub use analytics::{Report, ReportOptions, Summary};
pub use emotion::{EmotionLabel, EmotionSample, EmotionVector, SampleInput};
pub use error::CoreError;
pub use records::{AnalysisRecord, AttendanceLog, GeoLocation};
pub use samples::{SampleLog, Session};
pub use store::DescriptorStore;
pub use types::{Descriptor, EuclideanMatcher, Identity, MatchResult, Matcher};
