pub mod ledger;

pub use ledger::{PositionLedger, TrimFractions};
