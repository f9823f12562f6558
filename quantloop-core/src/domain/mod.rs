//! Domain types for quantloop

pub mod bar;
pub mod signal;

pub use bar::{first_unordered, Bar};
pub use signal::Signal;
