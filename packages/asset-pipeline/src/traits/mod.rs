//! Core trait abstractions for the pipeline.
//!
//! Each stage sits behind a trait so the controller can be driven by real
//! network/model backends in production and by the mocks in
//! [`testing`](crate::testing) in tests.

pub mod extractor;
pub mod fetcher;
pub mod reasoning;
pub mod store;
