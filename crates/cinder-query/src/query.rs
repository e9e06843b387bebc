//! Query model: parts, with clauses, merge queries and their combination

use crate::aggregate::Aggregate;
use crate::navigation::Navigation;
use crate::term::{MergeTerm, Operator, Term};
use cinder_core::{Direction, EdgeType, Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sort {
    pub name: String,
    pub order: SortOrder,
}

impl Sort {
    pub fn new(name: impl Into<String>, order: SortOrder) -> Self {
        Self {
            name: name.into(),
            order,
        }
    }
}

impl fmt::Display for Sort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.order)
    }
}

/// Condition on the number of matching neighbours of a with clause
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WithClauseFilter {
    pub op: Operator,
    pub num: i64,
}

impl WithClauseFilter {
    /// At least one neighbour matches
    pub fn any() -> Self {
        Self {
            op: Operator::GreaterThan,
            num: 0,
        }
    }

    /// No neighbour matches
    pub fn empty() -> Self {
        Self {
            op: Operator::Equals,
            num: 0,
        }
    }

    pub fn count(op: Operator, num: i64) -> Self {
        Self { op, num }
    }
}

impl fmt::Display for WithClauseFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.op, self.num) {
            (Operator::GreaterThan, 0) => f.write_str("any"),
            (Operator::Equals, 0) => f.write_str("empty"),
            (op, num) => write!(f, "count {op} {num}"),
        }
    }
}

/// Select entities by the neighbours reachable via `navigation` that match
/// `term` (and their own with clause).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithClause {
    pub filter: WithClauseFilter,
    pub navigation: Navigation,
    pub term: Option<Term>,
    pub with_clause: Option<Box<WithClause>>,
}

impl WithClause {
    pub fn new(filter: WithClauseFilter, navigation: Navigation) -> Self {
        Self {
            filter,
            navigation,
            term: None,
            with_clause: None,
        }
    }

    pub fn with_term(mut self, term: Term) -> Self {
        self.term = Some(term);
        self
    }

    fn change_paths(&self, f: &dyn Fn(&str) -> String) -> Self {
        Self {
            filter: self.filter.clone(),
            navigation: self.navigation.clone(),
            term: self.term.as_ref().map(|t| t.change_paths(f)),
            with_clause: self.with_clause.as_ref().map(|w| Box::new(w.change_paths(f))),
        }
    }

    fn simplify(&self) -> Self {
        Self {
            filter: self.filter.clone(),
            navigation: self.navigation.clone(),
            term: self.term.as_ref().map(Term::simplify),
            with_clause: self.with_clause.as_ref().map(|w| Box::new(w.simplify())),
        }
    }

    fn fill_edge_type(&mut self, edge_type: &str) {
        self.navigation.fill_edge_type(edge_type);
        if let Some(term) = &mut self.term {
            term.fill_edge_type(edge_type);
        }
        if let Some(with) = &mut self.with_clause {
            with.fill_edge_type(edge_type);
        }
    }
}

impl fmt::Display for WithClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "with({}, {}", self.filter, self.navigation)?;
        if let Some(term) = &self.term {
            write!(f, " {term}")?;
        }
        if let Some(with) = &self.with_clause {
            write!(f, " {with}")?;
        }
        f.write_str(")")
    }
}

/// One stage of a query: filter the current frontier, then optionally
/// continue via the navigation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    pub term: Term,
    /// Keep the result of this stage in the final output
    pub pinned: bool,
    pub navigation: Option<Navigation>,
    pub with_clause: Option<WithClause>,
    pub sort: Vec<Sort>,
    pub limit: Option<usize>,
}

impl Part {
    pub fn new(term: Term) -> Self {
        Self {
            term,
            pinned: false,
            navigation: None,
            with_clause: None,
            sort: Vec::new(),
            limit: None,
        }
    }

    pub fn with_navigation(mut self, navigation: Navigation) -> Self {
        self.navigation = Some(navigation);
        self
    }

    pub fn change_paths(&self, f: &dyn Fn(&str) -> String) -> Self {
        Self {
            term: self.term.change_paths(f),
            pinned: self.pinned,
            navigation: self.navigation.clone(),
            with_clause: self.with_clause.as_ref().map(|w| w.change_paths(f)),
            sort: self
                .sort
                .iter()
                .map(|s| Sort::new(f(&s.name), s.order))
                .collect(),
            limit: self.limit,
        }
    }

    pub fn simplify(&self) -> Self {
        Self {
            term: self.term.simplify(),
            with_clause: self.with_clause.as_ref().map(WithClause::simplify),
            ..self.clone()
        }
    }

    fn fill_edge_type(&mut self, edge_type: &str) {
        self.term.fill_edge_type(edge_type);
        if let Some(nav) = &mut self.navigation {
            nav.fill_edge_type(edge_type);
        }
        if let Some(with) = &mut self.with_clause {
            with.fill_edge_type(edge_type);
        }
    }
}

impl fmt::Display for Part {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.term)?;
        if let Some(with) = &self.with_clause {
            write!(f, " {with}")?;
        }
        if !self.sort.is_empty() {
            f.write_str(" sort ")?;
            for (idx, sort) in self.sort.iter().enumerate() {
                if idx > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{sort}")?;
            }
        }
        if let Some(limit) = self.limit {
            write!(f, " limit {limit}")?;
        }
        if let Some(nav) = &self.navigation {
            write!(f, " {nav}")?;
        }
        if self.pinned {
            f.write_str("+")?;
        }
        Ok(())
    }
}

/// A named sub-query whose result is merged into the owning entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeQuery {
    pub name: String,
    pub query: Query,
}

impl MergeQuery {
    pub fn new(name: impl Into<String>, query: Query) -> Self {
        Self {
            name: name.into(),
            query,
        }
    }

    pub fn change_paths(&self, f: &dyn Fn(&str) -> String) -> Self {
        Self {
            name: self.name.clone(),
            query: self.query.change_paths(f),
        }
    }

    pub fn simplify(&self) -> Self {
        Self {
            name: self.name.clone(),
            query: self.query.simplify(),
        }
    }
}

impl fmt::Display for MergeQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.query)
    }
}

#[derive(Deserialize)]
struct QueryData {
    parts: Vec<Part>,
    #[serde(default)]
    aggregate: Option<Aggregate>,
}

impl TryFrom<QueryData> for Query {
    type Error = Error;

    fn try_from(data: QueryData) -> Result<Self> {
        Query::new(data.parts, data.aggregate)
    }
}

/// A multi-hop query: a non-empty pipeline of parts with an optional
/// aggregation over the result of the last part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "QueryData")]
pub struct Query {
    parts: Vec<Part>,
    aggregate: Option<Aggregate>,
}

impl Query {
    pub fn new(parts: Vec<Part>, aggregate: Option<Aggregate>) -> Result<Self> {
        if parts.is_empty() {
            return Err(Error::IncompatibleQuery(
                "A query needs at least one part".to_string(),
            ));
        }
        Ok(Self { parts, aggregate })
    }

    /// Query with a single part filtered by `term`
    pub fn by(term: impl Into<Term>) -> Self {
        Self {
            parts: vec![Part::new(term.into())],
            aggregate: None,
        }
    }

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    pub fn aggregate(&self) -> Option<&Aggregate> {
        self.aggregate.as_ref()
    }

    /// The part that builder methods refine: the last one
    pub fn current_part(&self) -> &Part {
        match self.parts.last() {
            Some(part) => part,
            None => unreachable!("a query always has at least one part"),
        }
    }

    fn current_part_mut(&mut self) -> &mut Part {
        match self.parts.last_mut() {
            Some(part) => part,
            None => unreachable!("a query always has at least one part"),
        }
    }

    /// Refine the current part. If the current part already navigates
    /// somewhere, the filter applies to a new part at the end of that
    /// navigation.
    pub fn filter(mut self, term: impl Into<Term>) -> Self {
        let term = term.into();
        if self.current_part().navigation.is_some() {
            self.parts.push(Part::new(term));
        } else {
            let part = self.current_part_mut();
            let current = std::mem::replace(&mut part.term, Term::All);
            part.term = current.and(term);
        }
        self
    }

    /// Continue from the current part via the given navigation
    pub fn traverse(mut self, navigation: Navigation) -> Self {
        if self.current_part().navigation.is_some() {
            self.parts.push(Part::new(Term::All));
        }
        self.current_part_mut().navigation = Some(navigation);
        self
    }

    pub fn traverse_out(self) -> Self {
        self.traverse(Navigation::new(Direction::Outbound).with_edge_type(EdgeType::DEFAULT))
    }

    pub fn traverse_in(self) -> Self {
        self.traverse(Navigation::new(Direction::Inbound).with_edge_type(EdgeType::DEFAULT))
    }

    pub fn traverse_inout(self) -> Self {
        self.traverse(Navigation::new(Direction::Both).with_edge_type(EdgeType::DEFAULT))
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.current_part_mut().limit = Some(limit);
        self
    }

    pub fn with_sort(mut self, sort: Sort) -> Self {
        self.current_part_mut().sort.push(sort);
        self
    }

    pub fn with_aggregate(mut self, aggregate: Aggregate) -> Self {
        self.aggregate = Some(aggregate);
        self
    }

    pub fn pinned(mut self) -> Self {
        self.current_part_mut().pinned = true;
        self
    }

    /// Merge the entities reachable via `navigation` that match `term` into
    /// the entities of the current part under `name`. A merge query already
    /// defined under `name` is replaced in place.
    pub fn merge_with(mut self, name: &str, navigation: Navigation, term: impl Into<Term>) -> Self {
        let sub_query = Query {
            parts: vec![Part::new(Term::All).with_navigation(navigation), Part::new(term.into())],
            aggregate: None,
        };
        let merge = MergeQuery::new(name, sub_query);
        let part = self.current_part_mut();
        let current = std::mem::replace(&mut part.term, Term::All);
        part.term = match current {
            Term::Merge(mut m) => {
                match m.merges.iter_mut().find(|existing| existing.name == merge.name) {
                    Some(existing) => *existing = merge,
                    None => m.merges.push(merge),
                }
                Term::Merge(m)
            }
            other => Term::Merge(MergeTerm::new(other, vec![merge], Term::All)),
        };
        self
    }

    pub fn simplify(&self) -> Self {
        Self {
            parts: self.parts.iter().map(Part::simplify).collect(),
            aggregate: self.aggregate.clone(),
        }
    }

    /// Rewrite every property path of all parts and the aggregation
    pub fn change_paths(&self, f: &dyn Fn(&str) -> String) -> Self {
        Self {
            parts: self.parts.iter().map(|p| p.change_paths(f)).collect(),
            aggregate: self.aggregate.as_ref().map(|a| a.change_paths(f)),
        }
    }

    /// Combine two queries into one.
    ///
    /// If this query ends with a navigation, the parts of `other` simply
    /// follow. Otherwise the last part of this query and the first part of
    /// `other` are joined: terms with `and`, sorts concatenated and the
    /// smaller limit wins.
    pub fn combine(&self, other: &Query) -> Result<Query> {
        if self.aggregate.is_some() && other.aggregate.is_some() {
            return Err(Error::IncompatibleQuery(
                "Can not combine 2 aggregations".to_string(),
            ));
        }
        let aggregate = self.aggregate.clone().or_else(|| other.aggregate.clone());
        let left = self.current_part();

        let parts: Vec<Part> = if left.navigation.is_some() {
            self.parts.iter().chain(other.parts.iter()).cloned().collect()
        } else {
            let right = &other.parts[0];
            if left.with_clause.is_some() && right.with_clause.is_some() {
                return Err(Error::IncompatibleQuery(
                    "Can not combine 2 with clauses".to_string(),
                ));
            }
            if matches!(left.term, Term::Merge(_)) && matches!(right.term, Term::Merge(_)) {
                return Err(Error::IncompatibleQuery(
                    "Can not combine 2 merge clauses".to_string(),
                ));
            }
            let limit = match (left.limit, right.limit) {
                (Some(l), Some(r)) => Some(l.min(r)),
                (l, r) => l.or(r),
            };
            let joined = Part {
                term: left.term.clone().and(right.term.clone()),
                pinned: left.pinned || right.pinned,
                navigation: right.navigation.clone(),
                with_clause: left.with_clause.clone().or_else(|| right.with_clause.clone()),
                sort: left.sort.iter().chain(right.sort.iter()).cloned().collect(),
                limit,
            };
            let head = &self.parts[..self.parts.len() - 1];
            head.iter()
                .cloned()
                .chain(std::iter::once(joined))
                .chain(other.parts[1..].iter().cloned())
                .collect()
        };
        debug!("Combined queries into {} parts", parts.len());
        Query::new(parts, aggregate)
    }

    /// Replace all parts. Callers guarantee that `parts` is not empty.
    pub(crate) fn with_parts(mut self, parts: Vec<Part>) -> Self {
        self.parts = parts;
        self
    }

    /// Give every navigation without an explicit edge type the given one
    pub(crate) fn fill_edge_type(&mut self, edge_type: &str) {
        for part in &mut self.parts {
            part.fill_edge_type(edge_type);
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(aggregate) = &self.aggregate {
            write!(f, "{aggregate}")?;
        }
        for (idx, part) in self.parts.iter().enumerate() {
            if idx > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{part}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::P;
    use crate::parser::parse_query;
    use crate::term::Function;
    use cinder_core::Value;

    #[test]
    fn test_simple_query() {
        let query = Query::by("ec2")
            .filter(P::new("cpu").gt(4))
            .filter(P::new("mem").lt(23) | P::new("mem").lt(59))
            .traverse_out()
            .filter(P::new("some.int.value").lt(1))
            .filter(P::new("some.other").eq(23))
            .traverse_out()
            .filter(P::new("active").eq(12))
            .filter(P::function(Function::InSubnet).on("ip", vec![Value::from("1.2.3.4/32")]));

        assert_eq!(
            query.to_string(),
            "((is(\"ec2\") and cpu > 4) and (mem < 23 or mem < 59)) -default-> \
             (some.int.value < 1 and some.other == 23) -default-> \
             (active == 12 and in_subnet(ip, \"1.2.3.4/32\"))"
        );
    }

    #[test]
    fn test_simplify() {
        let query = Query::by(Term::All & (P::new("test").eq(true) & (Term::from("test") | Term::All)));
        assert_eq!(query.to_string(), "test == true");
    }

    #[test]
    fn test_combine() {
        let query1 = Query::by(P::new("test").eq(true))
            .traverse_out()
            .combine(&Query::by("foo"))
            .unwrap()
            .combine(&Query::by("bla"))
            .unwrap();
        assert_eq!(
            query1.to_string(),
            "test == true -default-> (is(\"foo\") and is(\"bla\"))"
        );

        let query2 = Query::by(P::new("test").eq(true))
            .traverse_out()
            .combine(&Query::by("foo").traverse_out())
            .unwrap()
            .combine(&Query::by("bla").traverse_out())
            .unwrap();
        assert_eq!(
            query2.to_string(),
            "test == true -default-> is(\"foo\") -default-> is(\"bla\") -default->"
        );

        let query3 = Query::by(P::new("test").eq(true))
            .traverse_out()
            .filter("boo")
            .traverse_out()
            .filter("bar")
            .combine(&Query::by("foo"))
            .unwrap()
            .combine(&Query::by("bla"))
            .unwrap();
        assert_eq!(
            query3.to_string(),
            "test == true -default-> is(\"boo\") -default-> ((is(\"bar\") and is(\"foo\")) and is(\"bla\"))"
        );
    }

    #[test]
    fn test_combine_limit_and_sort() {
        let query = Query::by("a")
            .with_limit(10)
            .with_sort(Sort::new("name", SortOrder::Asc))
            .combine(&Query::by("b").with_limit(2).with_sort(Sort::new("age", SortOrder::Desc)))
            .unwrap();
        // the minimum is taken
        assert_eq!(query.current_part().limit, Some(2));
        assert_eq!(
            query.to_string(),
            "(is(\"a\") and is(\"b\")) sort name asc, age desc limit 2"
        );
        let one_sided = Query::by("a").combine(&Query::by("b").with_limit(5)).unwrap();
        assert_eq!(one_sided.current_part().limit, Some(5));
    }

    #[test]
    fn test_combine_incompatible() {
        let aggregated = parse_query("aggregate(sum(1)): is(a)").unwrap();
        assert!(matches!(
            aggregated.combine(&aggregated),
            Err(Error::IncompatibleQuery(_))
        ));

        let left = parse_query("is(foo) with(empty, -default->)").unwrap();
        let right = parse_query("is(bla) with(empty, -default->)").unwrap();
        assert!(matches!(left.combine(&right), Err(Error::IncompatibleQuery(_))));

        let merged = parse_query("is(foo) {children[]: --> all}").unwrap();
        assert!(matches!(merged.combine(&merged), Err(Error::IncompatibleQuery(_))));

        // one aggregation is carried over
        let combined = Query::by("b").combine(&aggregated).unwrap();
        assert_eq!(combined.to_string(), "aggregate(sum(1)):(is(\"b\") and is(\"a\"))");
    }

    #[test]
    fn test_merge_with() {
        let query = Query::by("test").merge_with("ancestors.cloud", Navigation::until_root(), "cloud");
        assert_eq!(
            query.to_string(),
            "is(\"test\") {ancestors.cloud: all <-default[1:]- is(\"cloud\")}"
        );
        let twice = query.merge_with("descendants.volume", Navigation::until_leaf(), "volume");
        assert_eq!(
            twice.to_string(),
            "is(\"test\") {ancestors.cloud: all <-default[1:]- is(\"cloud\"), \
             descendants.volume: all -default[1:]-> is(\"volume\")}"
        );
        // the same name replaces the earlier merge query
        let replaced = twice.merge_with("ancestors.cloud", Navigation::until_root(), "region");
        assert_eq!(
            replaced.to_string(),
            "is(\"test\") {ancestors.cloud: all <-default[1:]- is(\"region\"), \
             descendants.volume: all -default[1:]-> is(\"volume\")}"
        );
    }

    #[test]
    fn test_traverse_adds_parts() {
        let query = Query::by("a").traverse_in().traverse_inout().pinned();
        assert_eq!(query.parts().len(), 2);
        assert_eq!(query.to_string(), "is(\"a\") <-default- all -default-+");
    }

    #[test]
    fn test_empty_query_is_rejected() {
        assert!(Query::new(vec![], None).is_err());
        let json = r#"{"parts": [], "aggregate": null}"#;
        assert!(serde_json::from_str::<Query>(json).is_err());
    }

    #[test]
    fn test_serde_round_trip() {
        let query = parse_query("is(a) and b > 1 with(any, <-- c == 2) sort b desc limit 3 -[0:2]-> all+").unwrap();
        let json = serde_json::to_string(&query).unwrap();
        let restored: Query = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, query);
    }

    #[test]
    fn test_with_clause_render() {
        let with = WithClause::new(
            WithClauseFilter::count(Operator::GreaterEquals, 3),
            Navigation::new(Direction::Outbound).with_edge_type("delete"),
        )
        .with_term(P::new("name").eq("test"));
        assert_eq!(with.to_string(), "with(count >= 3, -delete-> name == \"test\")");
        assert_eq!(WithClauseFilter::any().to_string(), "any");
        assert_eq!(WithClauseFilter::empty().to_string(), "empty");
    }
}
