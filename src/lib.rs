pub mod analysis;
pub mod attention;
pub mod bbox;
pub mod config;
pub mod correlation;
pub mod dataset;
pub mod error;
pub mod extractor;
pub mod frame;
pub mod math;
pub mod npy;
pub mod regression;
pub mod report;
pub mod scorer;
pub mod track;

pub use attention::{AttentionIndex, AttentionMap};
pub use error::Error;
pub use frame::Resolution;
pub use report::MemorabilityReport;
pub use scorer::Aggregator;
pub use track::TrackRecord;
