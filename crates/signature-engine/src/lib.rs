pub mod engine;
pub mod math;
pub mod weights;

pub use engine::{SignatureEngine, SignatureEngineConfig};
pub use weights::{EdxWeights, OxWeights, TsWeights};
