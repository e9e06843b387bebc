//! Term algebra
//!
//! A term is a boolean filter evaluated against a single graph entity.
//! Combining terms through [`Term::combine`] (or `&` / `|`) simplifies with
//! `all` as identity of `and` and absorbing element of `or`.

use crate::query::MergeQuery;
use cinder_core::value::write_quoted;
use cinder_core::Value;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitAnd, BitOr};

/// Boolean connective of a combined term
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoolOp {
    And,
    Or,
}

impl fmt::Display for BoolOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BoolOp::And => "and",
            BoolOp::Or => "or",
        })
    }
}

/// Comparison operator of a predicate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    LessEquals,
    GreaterEquals,
    GreaterThan,
    LessThan,
    Equals,
    NotEquals,
    /// Regular expression match (=~)
    Matches,
    /// Regular expression non-match (!~)
    NotMatches,
    /// Membership in an array value
    In,
    NotIn,
}

impl Operator {
    pub fn as_str(self) -> &'static str {
        match self {
            Operator::LessEquals => "<=",
            Operator::GreaterEquals => ">=",
            Operator::GreaterThan => ">",
            Operator::LessThan => "<",
            Operator::Equals => "==",
            Operator::NotEquals => "!=",
            Operator::Matches => "=~",
            Operator::NotMatches => "!~",
            Operator::In => "in",
            Operator::NotIn => "not in",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Functions that can be applied to a property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Function {
    /// `in_subnet(ip, "10.0.0.0/16")`
    InSubnet,
    /// `has_desired_change(path)`
    HasDesiredChange,
}

impl Function {
    pub fn as_str(self) -> &'static str {
        match self {
            Function::InSubnet => "in_subnet",
            Function::HasDesiredChange => "has_desired_change",
        }
    }

    /// Look up a function by its name in the query language
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "in_subnet" => Some(Function::InSubnet),
            "has_desired_change" => Some(Function::HasDesiredChange),
            _ => None,
        }
    }
}

/// `name op value`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    pub name: String,
    pub op: Operator,
    pub value: Value,
}

/// `function(property, args...)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionTerm {
    pub function: Function,
    pub property: String,
    pub args: Vec<Value>,
}

/// A filter that needs the result of merge queries.
///
/// `pre_filter` is evaluated on the entity alone, the merge queries are
/// merged into the entity under their names, then `post_filter` applies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeTerm {
    pub pre_filter: Box<Term>,
    pub merges: Vec<MergeQuery>,
    pub post_filter: Box<Term>,
}

impl MergeTerm {
    pub fn new(pre_filter: Term, merges: Vec<MergeQuery>, post_filter: Term) -> Self {
        Self {
            pre_filter: Box::new(pre_filter),
            merges,
            post_filter: Box::new(post_filter),
        }
    }

    /// Merge query with the given name, if defined
    pub fn merge_named(&self, name: &str) -> Option<&MergeQuery> {
        self.merges.iter().find(|m| m.name == name)
    }
}

/// Boolean term tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Term {
    /// Matches every entity
    All,
    Predicate(Predicate),
    Function(FunctionTerm),
    /// Entity is of one of the given kinds
    Is(Vec<String>),
    /// Entity has exactly this id
    Id(String),
    Combined {
        left: Box<Term>,
        op: BoolOp,
        right: Box<Term>,
    },
    Merge(MergeTerm),
}

impl Term {
    /// Kind test over one or more kinds. Duplicates are dropped.
    pub fn is<I, S>(kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut unique: Vec<String> = Vec::new();
        for kind in kinds {
            let kind = kind.into();
            if !unique.contains(&kind) {
                unique.push(kind);
            }
        }
        Term::Is(unique)
    }

    /// Combined term exactly as written, without simplification
    pub fn new_combined(left: Term, op: BoolOp, right: Term) -> Self {
        Term::Combined {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    /// Combine two terms, applying the identity and absorbing laws of `all`.
    ///
    /// Merge terms stay at the top of the result, so a combination is always
    /// expressible in the query language.
    pub fn combine(left: Term, op: BoolOp, right: Term) -> Term {
        match (op, left, right) {
            (BoolOp::And, Term::All, other) | (BoolOp::And, other, Term::All) => other,
            (BoolOp::Or, Term::All, _) | (BoolOp::Or, _, Term::All) => Term::All,
            (BoolOp::And, Term::Merge(a), Term::Merge(b)) => {
                let merges = union_merges(a.merges, b.merges);
                Term::Merge(MergeTerm::new(
                    Term::combine(*a.pre_filter, BoolOp::And, *b.pre_filter),
                    merges,
                    Term::combine(*a.post_filter, BoolOp::And, *b.post_filter),
                ))
            }
            (BoolOp::And, Term::Merge(m), other) => Term::Merge(MergeTerm::new(
                *m.pre_filter,
                m.merges,
                Term::combine(*m.post_filter, BoolOp::And, other),
            )),
            (BoolOp::And, other, Term::Merge(m)) => Term::Merge(MergeTerm::new(
                *m.pre_filter,
                m.merges,
                Term::combine(other, BoolOp::And, *m.post_filter),
            )),
            (BoolOp::Or, Term::Merge(a), Term::Merge(b)) => {
                let merges = union_merges(a.merges, b.merges);
                let left = Term::combine(*a.pre_filter, BoolOp::And, *a.post_filter);
                let right = Term::combine(*b.pre_filter, BoolOp::And, *b.post_filter);
                Term::Merge(MergeTerm::new(
                    Term::All,
                    merges,
                    Term::combine(left, BoolOp::Or, right),
                ))
            }
            (BoolOp::Or, Term::Merge(m), other) => {
                let filter = Term::combine(*m.pre_filter, BoolOp::And, *m.post_filter);
                Term::Merge(MergeTerm::new(
                    Term::All,
                    m.merges,
                    Term::combine(filter, BoolOp::Or, other),
                ))
            }
            (BoolOp::Or, other, Term::Merge(m)) => {
                let filter = Term::combine(*m.pre_filter, BoolOp::And, *m.post_filter);
                Term::Merge(MergeTerm::new(
                    Term::All,
                    m.merges,
                    Term::combine(other, BoolOp::Or, filter),
                ))
            }
            (op, left, right) => Term::new_combined(left, op, right),
        }
    }

    pub fn and(self, other: Term) -> Term {
        Term::combine(self, BoolOp::And, other)
    }

    pub fn or(self, other: Term) -> Term {
        Term::combine(self, BoolOp::Or, other)
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Term::All)
    }

    /// Normalize the whole tree bottom-up with the laws of [`Term::combine`]
    pub fn simplify(&self) -> Term {
        match self {
            Term::Combined { left, op, right } => {
                Term::combine(left.simplify(), *op, right.simplify())
            }
            Term::Merge(m) => Term::Merge(MergeTerm::new(
                m.pre_filter.simplify(),
                m.merges.iter().map(MergeQuery::simplify).collect(),
                m.post_filter.simplify(),
            )),
            other => other.clone(),
        }
    }

    /// Operands of the top level `and` chain, left to right
    pub fn conjuncts(&self) -> Vec<&Term> {
        match self {
            Term::Combined {
                left,
                op: BoolOp::And,
                right,
            } => {
                let mut result = left.conjuncts();
                result.extend(right.conjuncts());
                result
            }
            other => vec![other],
        }
    }

    /// All property paths referenced by this term, in order of appearance
    pub fn property_paths(&self) -> Vec<&str> {
        let mut paths = Vec::new();
        self.collect_paths(&mut paths);
        paths
    }

    fn collect_paths<'a>(&'a self, paths: &mut Vec<&'a str>) {
        match self {
            Term::Predicate(p) => paths.push(&p.name),
            Term::Function(f) => paths.push(&f.property),
            Term::Combined { left, right, .. } => {
                left.collect_paths(paths);
                right.collect_paths(paths);
            }
            Term::Merge(m) => {
                m.pre_filter.collect_paths(paths);
                m.post_filter.collect_paths(paths);
            }
            Term::All | Term::Is(_) | Term::Id(_) => {}
        }
    }

    /// Give every navigation of the merge queries without an explicit edge
    /// type the given one.
    pub(crate) fn fill_edge_type(&mut self, edge_type: &str) {
        match self {
            Term::Combined { left, right, .. } => {
                left.fill_edge_type(edge_type);
                right.fill_edge_type(edge_type);
            }
            Term::Merge(m) => {
                m.pre_filter.fill_edge_type(edge_type);
                m.post_filter.fill_edge_type(edge_type);
                for merge in &mut m.merges {
                    merge.query.fill_edge_type(edge_type);
                }
            }
            _ => {}
        }
    }

    /// Rewrite every property path, including those of merge queries
    pub fn change_paths(&self, f: &dyn Fn(&str) -> String) -> Term {
        match self {
            Term::Predicate(p) => Term::Predicate(Predicate {
                name: f(&p.name),
                op: p.op,
                value: p.value.clone(),
            }),
            Term::Function(func) => Term::Function(FunctionTerm {
                function: func.function,
                property: f(&func.property),
                args: func.args.clone(),
            }),
            Term::Combined { left, op, right } => {
                Term::new_combined(left.change_paths(f), *op, right.change_paths(f))
            }
            Term::Merge(m) => Term::Merge(MergeTerm::new(
                m.pre_filter.change_paths(f),
                m.merges.iter().map(|q| q.change_paths(f)).collect(),
                m.post_filter.change_paths(f),
            )),
            other => other.clone(),
        }
    }
}

/// Merges of both sides. On a name clash the left merge wins.
fn union_merges(mut left: Vec<MergeQuery>, right: Vec<MergeQuery>) -> Vec<MergeQuery> {
    for merge in right {
        if !left.iter().any(|m| m.name == merge.name) {
            left.push(merge);
        }
    }
    left
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::All => f.write_str("all"),
            Term::Predicate(p) => write!(f, "{} {} {}", p.name, p.op, p.value),
            Term::Function(func) => {
                write!(f, "{}({}", func.function.as_str(), func.property)?;
                for arg in &func.args {
                    write!(f, ", {arg}")?;
                }
                f.write_str(")")
            }
            Term::Is(kinds) => {
                f.write_str("is(")?;
                for (idx, kind) in kinds.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(",")?;
                    }
                    write_quoted(f, kind)?;
                }
                f.write_str(")")
            }
            Term::Id(id) => {
                f.write_str("id(")?;
                write_quoted(f, id)?;
                f.write_str(")")
            }
            Term::Combined { left, op, right } => write!(f, "({left} {op} {right})"),
            Term::Merge(m) => {
                write!(f, "{} {{", m.pre_filter)?;
                for (idx, merge) in m.merges.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{merge}")?;
                }
                f.write_str("}")?;
                if !m.post_filter.is_all() {
                    write!(f, " {}", m.post_filter)?;
                }
                Ok(())
            }
        }
    }
}

impl BitAnd for Term {
    type Output = Term;

    fn bitand(self, rhs: Term) -> Term {
        self.and(rhs)
    }
}

impl BitOr for Term {
    type Output = Term;

    fn bitor(self, rhs: Term) -> Term {
        self.or(rhs)
    }
}

/// A bare name is a kind test: `Query::by("ec2")` selects `is("ec2")`
impl From<&str> for Term {
    fn from(kind: &str) -> Self {
        Term::is([kind])
    }
}

impl From<Predicate> for Term {
    fn from(p: Predicate) -> Self {
        Term::Predicate(p)
    }
}

impl From<MergeTerm> for Term {
    fn from(m: MergeTerm) -> Self {
        Term::Merge(m)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::builder::P;
    use crate::parser::parse_term;
    use num_bigint::BigInt;
    use proptest::prelude::*;

    #[test]
    fn test_simplify() {
        // some_criteria | all => all
        assert_eq!((Term::from("test") | Term::All).to_string(), "all");
        // some_criteria & all => some_criteria
        assert_eq!((Term::from("test") & Term::All).to_string(), "is(\"test\")");
        // also works in nested setup
        let nested = Term::All & (P::new("test").eq(true) & (Term::from("test") | Term::All));
        assert_eq!(nested.to_string(), "test == true");
    }

    #[test]
    fn test_simplify_parsed_tree() {
        let term = parse_term("all and (a == 1 and (is(x) or all))").unwrap();
        assert_eq!(term.to_string(), "(all and (a == 1 and (is(\"x\") or all)))");
        assert_eq!(term.simplify().to_string(), "a == 1");
    }

    #[test]
    fn test_render() {
        assert_eq!(Term::is(["a", "b", "a"]).to_string(), "is(\"a\",\"b\")");
        assert_eq!(Term::Id("root".into()).to_string(), "id(\"root\")");
        assert_eq!(
            P::function(Function::InSubnet)
                .on("ip", vec![Value::from("1.2.3.4/32")])
                .to_string(),
            "in_subnet(ip, \"1.2.3.4/32\")"
        );
        assert_eq!(P::new("num").is_not_in(vec![1, 2]).to_string(), "num not in [1, 2]");
        assert_eq!(
            ((P::new("a").lt(1) & P::new("b").gt(2)) | P::new("c").matches("x.*")).to_string(),
            "((a < 1 and b > 2) or c =~ \"x.*\")"
        );
    }

    #[test]
    fn test_conjuncts() {
        let term = parse_term("a < 1 and (b < 2 or c < 3) and (d < 4 and e < 5)").unwrap();
        let rendered: Vec<String> = term.conjuncts().iter().map(|t| t.to_string()).collect();
        assert_eq!(
            rendered,
            vec!["a < 1", "(b < 2 or c < 3)", "d < 4", "e < 5"]
        );
        let or_term = parse_term("a < 1 or b < 2").unwrap();
        assert_eq!(or_term.conjuncts().len(), 1);
    }

    #[test]
    fn test_property_paths() {
        let term = parse_term("a < 1 and (in_subnet(ip, \"10.0.0.0/8\") or is(x)) and b.c == 2").unwrap();
        assert_eq!(term.property_paths(), vec!["a", "ip", "b.c"]);
    }

    #[test]
    fn test_change_paths() {
        let term = parse_term("a < 1 or has_desired_change(b)").unwrap();
        let changed = term.change_paths(&|p| format!("x.{p}"));
        assert_eq!(changed.to_string(), "(x.a < 1 or has_desired_change(x.b))");
    }

    #[test]
    fn test_combine_merge_terms() {
        let merged = parse_term("a < 1 {ancestors.b: <-[1:]- is(b)} ancestors.b.c == 1").unwrap();
        let with_and = merged.clone() & P::new("d").eq(2);
        assert_eq!(
            with_and.to_string(),
            "a < 1 {ancestors.b: all <-default[1:]- is(\"b\")} (ancestors.b.c == 1 and d == 2)"
        );
        let with_or = merged | P::new("d").eq(2);
        assert_eq!(
            with_or.to_string(),
            "all {ancestors.b: all <-default[1:]- is(\"b\")} ((a < 1 and ancestors.b.c == 1) or d == 2)"
        );
    }

    const KEYWORDS: [&str; 10] = ["and", "or", "not", "in", "true", "false", "null", "with", "sort", "limit"];

    const COMPARISONS: [Operator; 8] = [
        Operator::LessEquals,
        Operator::GreaterEquals,
        Operator::GreaterThan,
        Operator::LessThan,
        Operator::Equals,
        Operator::NotEquals,
        Operator::Matches,
        Operator::NotMatches,
    ];

    /// Dotted and array paths, names that are keywords and, if `absolute`,
    /// paths anchored at the root
    fn any_name(absolute: bool) -> BoxedStrategy<String> {
        let relative = prop_oneof![
            "p[a-z]{0,2}(\\.[a-z]{1,3}){0,2}",
            "p[a-z]{0,2}\\[(\\*|[0-9]{0,2})\\](\\.[a-z]{1,3})?",
            prop::sample::select(KEYWORDS.to_vec()).prop_map(String::from),
        ];
        if absolute {
            prop_oneof![3 => relative, 1 => "/z[a-z]{0,2}(\\.[a-z]{1,3})?"].boxed()
        } else {
            relative.boxed()
        }
    }

    fn any_scalar() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::from),
            any::<i64>().prop_map(Value::from),
            ("[1-9][0-9]{19,24}", any::<bool>()).prop_map(|(digits, negative)| {
                let big: BigInt = digits.parse().unwrap();
                Value::from(if negative { -big } else { big })
            }),
            (-1e6f64..1e6).prop_map(Value::from),
            "\\PC{0,6}".prop_map(Value::from),
        ]
    }

    fn any_predicate(names: BoxedStrategy<String>) -> impl Strategy<Value = Term> {
        let comparison = (names.clone(), prop::sample::select(COMPARISONS.to_vec()), any_scalar());
        let membership = (
            names,
            prop::sample::select(vec![Operator::In, Operator::NotIn]),
            prop::collection::vec(any_scalar(), 0..3).prop_map(Value::Array),
        );
        prop_oneof![3 => comparison, 1 => membership]
            .prop_map(|(name, op, value)| Term::Predicate(Predicate { name, op, value }))
    }

    fn leaf(absolute: bool) -> impl Strategy<Value = Term> {
        let names = any_name(absolute);
        prop_oneof![
            1 => Just(Term::All),
            1 => prop::collection::vec("[a-z]{1,3}", 1..4).prop_map(|kinds| Term::is(kinds)),
            1 => "[a-z0-9-]{1,8}".prop_map(Term::Id),
            6 => any_predicate(names.clone()),
            1 => (names.clone(), "10\\.[0-9]{1,3}\\.0\\.0/[0-9]{1,2}").prop_map(|(name, net)| {
                P::function(Function::InSubnet).on(name, vec![Value::from(net)])
            }),
            1 => names.prop_map(|name| P::function(Function::HasDesiredChange).on(name, vec![])),
        ]
    }

    fn term_tree(absolute: bool) -> impl Strategy<Value = Term> {
        leaf(absolute).prop_recursive(4, 24, 2, |inner| {
            (inner.clone(), prop_oneof![Just(BoolOp::And), Just(BoolOp::Or)], inner)
                .prop_map(|(l, op, r)| Term::new_combined(l, op, r))
        })
    }

    pub(crate) fn any_term() -> impl Strategy<Value = Term> {
        term_tree(true)
    }

    /// Terms without root anchored paths
    pub(crate) fn any_relative_term() -> impl Strategy<Value = Term> {
        term_tree(false)
    }

    proptest! {
        #[test]
        fn prop_all_is_identity_of_and(t in any_term()) {
            let combined = Term::new_combined(t.clone(), BoolOp::And, Term::All);
            prop_assert_eq!(combined.simplify(), t.simplify());
        }

        #[test]
        fn prop_all_absorbs_or(t in any_term()) {
            let combined = Term::new_combined(t, BoolOp::Or, Term::All);
            prop_assert_eq!(combined.simplify(), Term::All);
        }

        #[test]
        fn prop_simplify_is_idempotent(t in any_term()) {
            let once = t.simplify();
            prop_assert_eq!(once.simplify(), once);
        }

        #[test]
        fn prop_render_parse_round_trip(t in any_term()) {
            let parsed = parse_term(&t.to_string()).unwrap();
            prop_assert_eq!(parsed, t);
        }
    }
}
