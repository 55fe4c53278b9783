pub mod budget;
pub mod config;
pub mod error;
pub mod grid;

pub use budget::MemoryBudget;
pub use config::{validate_dimensions, GridConfig};
pub use error::{GridError, Result};
pub use grid::Grid;
