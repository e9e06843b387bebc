//! Programmatic construction of terms
//!
//! ```
//! use cinder_query::builder::P;
//! use cinder_query::Query;
//!
//! let query = Query::by(P::of_kind("ec2") & P::new("cpu").gt(4));
//! assert_eq!(query.to_string(), "(is(\"ec2\") and cpu > 4)");
//! ```

use crate::term::{Function, FunctionTerm, Operator, Predicate, Term};
use cinder_core::Value;

/// Builder for predicates over a single property path
#[derive(Debug, Clone)]
pub struct P {
    name: String,
}

impl P {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn of_kind(kind: impl Into<String>) -> Term {
        Term::is([kind.into()])
    }

    pub fn with_id(id: impl Into<String>) -> Term {
        Term::Id(id.into())
    }

    pub fn function(function: Function) -> PFunction {
        PFunction { function }
    }

    fn predicate(self, op: Operator, value: impl Into<Value>) -> Term {
        Term::Predicate(Predicate {
            name: self.name,
            op,
            value: value.into(),
        })
    }

    pub fn eq(self, value: impl Into<Value>) -> Term {
        self.predicate(Operator::Equals, value)
    }

    pub fn ne(self, value: impl Into<Value>) -> Term {
        self.predicate(Operator::NotEquals, value)
    }

    pub fn gt(self, value: impl Into<Value>) -> Term {
        self.predicate(Operator::GreaterThan, value)
    }

    pub fn ge(self, value: impl Into<Value>) -> Term {
        self.predicate(Operator::GreaterEquals, value)
    }

    pub fn lt(self, value: impl Into<Value>) -> Term {
        self.predicate(Operator::LessThan, value)
    }

    pub fn le(self, value: impl Into<Value>) -> Term {
        self.predicate(Operator::LessEquals, value)
    }

    /// Regular expression match
    pub fn matches(self, regex: impl Into<String>) -> Term {
        self.predicate(Operator::Matches, Value::String(regex.into()))
    }

    pub fn not_matches(self, regex: impl Into<String>) -> Term {
        self.predicate(Operator::NotMatches, Value::String(regex.into()))
    }

    pub fn is_in(self, values: impl Into<Value>) -> Term {
        self.predicate(Operator::In, values)
    }

    pub fn is_not_in(self, values: impl Into<Value>) -> Term {
        self.predicate(Operator::NotIn, values)
    }
}

/// Builder for function terms, see [`P::function`]
#[derive(Debug, Clone, Copy)]
pub struct PFunction {
    function: Function,
}

impl PFunction {
    pub fn on(self, property: impl Into<String>, args: Vec<Value>) -> Term {
        Term::Function(FunctionTerm {
            function: self.function,
            property: property.into(),
            args,
        })
    }
}
