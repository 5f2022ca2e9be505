//! Core logic for regcopy
//!
//! This crate provides:
//! - Image reference parsing
//! - Registry-bound image handles with a mutable reference
//! - Tag selection by regular expression
//! - Manifest and blob transfer between registries
//! - Orchestration of single and multi-tag inspect/copy runs

mod error;
mod filter;
mod image;
mod replicate;
mod transfer;

pub use error::*;
pub use filter::*;
pub use image::*;
pub use replicate::*;
pub use transfer::*;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
