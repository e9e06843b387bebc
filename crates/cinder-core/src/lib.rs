//! Cinder Core Library
//!
//! This crate provides the literal values, the graph-model vocabulary and the
//! error handling shared by the Cinder query front end.
//!
//! # Modules
//!
//! - `error` - Error types and result aliases
//! - `value` - Literal values used by predicates and function arguments
//! - `model` - Directions, edge types, sections and relative namespaces

pub mod error;
pub mod model;
pub mod value;

pub use error::{Error, Result};
pub use model::{Direction, EdgeType, Kinship, Section, resolved_ancestor_properties};
pub use value::Value;
