//! Configuration parsing for regcopy
//!
//! This crate handles parsing of the Docker credentials config
//! (`~/.docker/config.json`): the `credsStore`, `credHelpers` and `auths`
//! fields. Everything else in the file is ignored.

mod docker;
mod error;

pub use docker::*;
pub use error::*;
