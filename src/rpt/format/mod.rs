//! File format parsing layer for report containers.
//!
//! This module bridges raw bytes held by a [`ByteReader`](crate::rpt::utils::ByteReader)
//! and the high-level [`RptFile`](crate::rpt::reader::RptFile).
//!
//! # Module Organization
//!
//! - [`header`]: signature, `domain:species` line and table directory
//! - [`page_table`]: fixed 24-byte page entries
//! - [`sections`]: section triplets, with tolerant marker search
//! - [`binary_table`]: attachment chunk entries
//! - [`object_header`]: the metadata page in front of an attachment

pub mod binary_table;
pub mod header;
pub mod object_header;
pub mod page_table;
pub mod sections;
