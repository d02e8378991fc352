//! Lightbox - a shared image, thumbnail and preview loader.
//!
//! Loader threads decode images on behalf of their consumers. Identical
//! requests from any thread are coalesced into one decode, results are kept
//! in a process-wide cache, and progress notifications are throttled.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Application layer containing the thumbnail and preview services.
pub mod application;
/// Domain layer containing entities, errors, and port definitions.
pub mod domain;
/// Infrastructure layer containing the cache, threads and adapters.
pub mod infrastructure;

/// Current version of the application.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name.
pub const NAME: &str = "lightbox";
