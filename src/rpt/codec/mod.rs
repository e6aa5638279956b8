//! Codec layer: pure data transformations with no knowledge of table layout.
//!
//! # Submodules
//!
//! - [`compression`][]: zlib inflate/deflate of individual records
//! - [`sniff`][]: content-signature classification of attachments

pub mod compression;
pub mod sniff;
