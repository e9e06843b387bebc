//! Cinder - query front end of a graph based cloud inventory
//!
//! This is the main library crate that re-exports all Cinder components.

pub use cinder_core as core;
pub use cinder_query as query;

// Re-export commonly used types
pub use cinder_core::{Direction, EdgeType, Error, Kinship, Result, Section, Value};

pub use cinder_query::{
    parse_query, parse_query_on_section, parse_query_with, parse_term, MergeQuery, Navigation,
    Part, Query, QueryOptions, Term, P,
};
