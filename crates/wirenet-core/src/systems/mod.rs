//! Systems - logic that operates on components

pub mod grid;
pub mod links;
pub mod signal;
pub mod validation;

pub use grid::*;
pub use links::*;
pub use signal::*;
pub use validation::*;
