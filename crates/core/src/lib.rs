//! # flowtest-core
//!
//! Storage primitives shared by the flowtest engine:
//!
//! - [`ByteKey`]: opaque key with canonical unsigned-lexicographic order
//! - [`KeyBuilder`]: composite keys whose byte order follows their parts
//! - [`InMemoryDb`]: sorted column-family store keyed by [`ByteKey`]

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod bytes;
pub mod db;
pub mod error;

pub use bytes::{ByteKey, KeyBuilder, compare};
pub use db::{ColumnFamily, InMemoryDb};
pub use error::{Error, Result};
