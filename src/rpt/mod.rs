//! Core report container module

pub mod attachment;
pub mod batch;
pub mod builder;
pub mod codec;
pub mod format;
pub mod layout;
pub mod names;
pub mod reader;
pub mod select;
pub mod types;
pub mod utils;
mod writer;

pub use builder::{AttachmentInput, BuildOptions, RptBuilder, SectionSpec};
pub use reader::{Extraction, ExtractionSummary, RptFile, SectionNames};
pub use types::error::{Result, RptError};
