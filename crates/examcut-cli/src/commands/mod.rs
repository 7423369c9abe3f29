pub mod extract;

pub use extract::{run, StrategyArg};
