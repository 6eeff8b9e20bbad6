#[allow(clippy::module_inception)]
mod catalog;

pub use catalog::*;
