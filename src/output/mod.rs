//! Output formatting module
//!
//! Console renderings of a result tree and the JUnit report writer.

mod formatter;
mod junit;

pub use formatter::{OutputFormat, ResultFormatter};
pub use junit::{flatten, JUnitFormatter};
