pub mod aggregator;
pub mod baseline;

pub use aggregator::{BraidRecord, PatternAggregator, PatternAggregatorConfig};
pub use baseline::BaselineTracker;
