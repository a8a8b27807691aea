pub mod accuracy;
pub mod error;
pub mod external;
pub mod find_union;
pub mod freshness;
pub mod hints;
pub mod joiner;
pub mod partition;
pub mod runner;
pub mod training;
pub mod translate;
#[macro_use]
extern crate log;

pub use error::{PipelineError, Result};
