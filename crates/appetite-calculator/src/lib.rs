pub mod calculator;

pub use calculator::{AppetiteCalculator, AppetiteCalculatorConfig, AppetiteInputs};
