//! Export core modules shared across CLI and other front-ends.

#[cfg(feature = "excel")]
pub mod excel_core;
