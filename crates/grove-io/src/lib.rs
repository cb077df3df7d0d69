//! CSV dataset loading and JSON report artifacts for grove.

mod domain;
mod error;
mod reader;
mod writer;

pub use domain::ExperimentName;
pub use error::IoError;
pub use reader::DatasetReader;
pub use writer::ReportWriter;
