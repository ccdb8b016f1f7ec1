//! Data types shared by every pipeline stage.

pub mod analysis;
pub mod cache;
pub mod config;
pub mod document;
pub mod fingerprint;
pub mod narrative;
pub mod report;
pub mod schema;
pub mod section;
pub mod source;
