//! Cinder Query Front End
//!
//! Turns the textual inventory query language into an immutable query plan.
//!
//! # Overview
//!
//! The query front end implements:
//! - A logos based lexer and a recursive descent parser
//! - The term algebra with simplification and canonical rendering
//! - Navigation, part and query model with programmatic builders
//! - Section rewriting of property paths
//! - Merge queries for ancestor and descendant properties
//! - Combination of queries
//!
//! ```
//! use cinder_query::parse_query;
//!
//! let query = parse_query("is(instance) and cpu > 4 --> is(volume)").unwrap();
//! assert_eq!(
//!     query.to_string(),
//!     "(is(\"instance\") and cpu > 4) -default-> is(\"volume\")"
//! );
//! ```

pub mod aggregate;
pub mod ancestors;
pub mod builder;
pub mod lexer;
pub mod navigation;
pub mod options;
pub mod parser;
pub mod query;
pub mod section;
pub mod term;

pub use aggregate::{Aggregate, AggregateFunction, AggregateOp, AggregateVariable};
pub use ancestors::AncestorRewriter;
pub use builder::P;
pub use lexer::{tokenize, Token};
pub use navigation::Navigation;
pub use options::QueryOptions;
pub use parser::{parse_query, parse_query_on_section, parse_query_with, parse_term};
pub use query::{MergeQuery, Part, Query, Sort, SortOrder, WithClause, WithClauseFilter};
pub use term::{BoolOp, Function, MergeTerm, Operator, Term};

// Type alias for the underlying logos lexer
pub type QueryLexer<'a> = logos::Lexer<'a, Token>;
