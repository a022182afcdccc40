pub mod machine;
pub mod predicates;

pub use machine::{StateMachineConfig, StateUpdate, TrendStateMachine};
pub use predicates::AlignmentPredicate;
