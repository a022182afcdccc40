pub mod classifier;

pub use classifier::{OutcomeClassifier, OutcomeClassifierConfig};
