//! Data models for the campaign people backend.
//!
//! Wire format is camelCase JSON end to end.

mod campaign;
pub mod meta;
mod person;
mod tag;

pub use campaign::*;
pub use person::*;
pub use tag::*;
