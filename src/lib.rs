#![doc = include_str!("../README.md")]
#![deny(missing_docs)]
#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod rate_limiter;
pub use rate_limiter::*;

mod limiter;
pub use limiter::*;

mod runtime;
pub use runtime::*;

mod error;
pub use error::*;

mod common;
pub use common::*;

pub mod ds;
pub mod store;

#[cfg(test)]
mod tests;
