#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Core type definitions for the chords allocation engine
//!
//! This crate provides the value types every other crate speaks in:
//! resource classes, access modes, matching attributes and requests.

pub mod attributes;
pub mod class;
pub mod request;

// Re-export commonly used types
pub use attributes::{AttrValue, Attributes};
pub use class::ResourceClass;
pub use request::{AccessMode, Request};
