pub mod builder;
pub mod indicators;
pub mod ring_buffer;

pub use builder::{FeatureBuilder, FeatureBuilderConfig, MIN_WARMUP_BARS};
pub use ring_buffer::BarRingBuffer;
