//! Repository implementations for database operations

pub mod backtests;
pub mod bars;
pub mod orders;
pub mod strategies;

pub use backtests::*;
pub use bars::*;
pub use orders::*;
pub use strategies::*;
