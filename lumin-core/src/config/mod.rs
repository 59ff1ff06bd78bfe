//! Configuration types
//!
//! Link configuration, optionally persisted as postcard binary data.

pub mod link;

pub use link::*;
