//! Ancestor and descendant merge rewriting
//!
//! A path like `ancestors.cloud.reported.name` refers to a property of the
//! closest ancestor of kind `cloud`. The rewriter adds a merge query named
//! `ancestors.cloud` for it and moves every filter that does not depend on
//! merged data in front of the merge.

use crate::navigation::Navigation;
use crate::options::QueryOptions;
use crate::query::{MergeQuery, Part, Query};
use crate::term::{MergeTerm, Term};
use cinder_core::{resolved_ancestor_properties, EdgeType, Error, Kinship, Result};
use std::collections::BTreeSet;
use tracing::debug;

/// Creates merge queries for ancestor and descendant paths
#[derive(Debug, Clone)]
pub struct AncestorRewriter {
    default_edge_type: String,
    resolved_properties: BTreeSet<String>,
}

impl Default for AncestorRewriter {
    fn default() -> Self {
        Self {
            default_edge_type: EdgeType::DEFAULT.to_string(),
            resolved_properties: resolved_ancestor_properties(),
        }
    }
}

impl From<&QueryOptions> for AncestorRewriter {
    fn from(options: &QueryOptions) -> Self {
        Self {
            default_edge_type: options.default_edge_type.clone(),
            resolved_properties: options.resolved_properties.clone(),
        }
    }
}

/// Name of the merge query that provides `path`: `<namespace>.<kind>`
fn merge_name(path: &str) -> Result<(Kinship, &str, String)> {
    let kinship = Kinship::of_path(path).ok_or_else(|| {
        Error::InvalidMergePath(format!(
            "{path}: only ancestors and descendants can be merged"
        ))
    })?;
    let mut segments = path.splitn(3, '.');
    let (_, kind, rest) = (segments.next(), segments.next(), segments.next());
    match (kind, rest) {
        (Some(kind), Some(rest)) if !kind.is_empty() && !rest.is_empty() => {
            Ok((kinship, kind, format!("{}.{kind}", kinship.namespace())))
        }
        _ => Err(Error::InvalidMergePath(format!(
            "{path}: expected {}.<kind>.<property>",
            kinship.namespace()
        ))),
    }
}

impl AncestorRewriter {
    pub fn new(default_edge_type: impl Into<String>, resolved_properties: BTreeSet<String>) -> Self {
        Self {
            default_edge_type: default_edge_type.into(),
            resolved_properties,
        }
    }

    /// Returns true if filtering on `path` requires merged data
    fn needs_merge(&self, path: &str) -> bool {
        Kinship::of_path(path).is_some() && !self.resolved_properties.contains(path)
    }

    /// `all <-default[1:]- is("kind")` for ancestors, outbound for descendants
    fn merge_query(&self, kinship: Kinship, kind: &str, name: String) -> MergeQuery {
        let navigation = Navigation {
            start: 1,
            until: None,
            edge_type: Some(self.default_edge_type.clone()),
            direction: kinship.direction(),
        };
        let parts = vec![
            Part::new(Term::All).with_navigation(navigation),
            Part::new(Term::is([kind])),
        ];
        MergeQuery::new(name, Query::by(Term::All).with_parts(parts))
    }

    /// Merge queries that `part` needs to provide `paths`: the merges the part
    /// already defines, followed by new ones for every kind not yet merged.
    pub fn merge_queries_for(&self, part: &Part, paths: &[&str]) -> Result<Vec<MergeQuery>> {
        let mut merges = match &part.term {
            Term::Merge(m) => m.merges.clone(),
            _ => Vec::new(),
        };
        for path in paths {
            let (kinship, kind, name) = merge_name(path)?;
            if !merges.iter().any(|m| m.name == name) {
                merges.push(self.merge_query(kinship, kind, name));
            }
        }
        Ok(merges)
    }

    /// Rewrite all parts of the query. The last part additionally has to
    /// provide the `additional` paths and those of the aggregation.
    pub fn rewrite(&self, query: &Query, additional: &[&str]) -> Result<Query> {
        let last = query.parts().len() - 1;
        let mut extra: Vec<&str> = additional.to_vec();
        if let Some(aggregate) = query.aggregate() {
            extra.extend(aggregate.property_paths());
        }
        let parts = query
            .parts()
            .iter()
            .enumerate()
            .map(|(idx, part)| {
                let paths: &[&str] = if idx == last { &extra } else { &[] };
                self.rewrite_part(part, paths)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(query.clone().with_parts(parts))
    }

    fn rewrite_part(&self, part: &Part, extra: &[&str]) -> Result<Part> {
        let (pre, existing, post) = match &part.term {
            Term::Merge(m) => (
                (*m.pre_filter).clone(),
                m.merges.clone(),
                (*m.post_filter).clone(),
            ),
            term => (Term::All, Vec::new(), term.clone()),
        };

        let mut needed: Vec<&str> = pre
            .property_paths()
            .into_iter()
            .chain(post.property_paths())
            .filter(|p| self.needs_merge(p))
            .collect();
        needed.extend(extra.iter().copied().filter(|p| self.needs_merge(p)));

        let merges = self.merge_queries_for(part, &needed)?;
        let created = merges.len() - existing.len();
        if created == 0 && !matches!(part.term, Term::Merge(_)) {
            return Ok(part.clone());
        }

        let merge_prefixes: Vec<String> = merges.iter().map(|m| format!("{}.", m.name)).collect();
        let depends_on_merge = |term: &Term| {
            term.property_paths().iter().any(|path| {
                self.needs_merge(path) || merge_prefixes.iter().any(|prefix| path.starts_with(prefix.as_str()))
            })
        };

        // a pre filter runs before the merge, so it can not see merged values
        let (moved, pre_kept): (Vec<&Term>, Vec<&Term>) =
            pre.conjuncts().into_iter().partition(|t| depends_on_merge(*t));
        let (pre, post) = if moved.is_empty() {
            (pre.clone(), post)
        } else {
            (conjunction(&pre_kept), conjunction(&moved).and(post))
        };

        let (kept, lifted): (Vec<&Term>, Vec<&Term>) =
            post.conjuncts().into_iter().partition(|t| depends_on_merge(*t));

        let (pre, post) = if lifted.is_empty() {
            (pre, post.clone())
        } else if kept.is_empty() {
            (pre.and(post.clone()), Term::All)
        } else {
            (pre.and(conjunction(&lifted)), conjunction(&kept))
        };
        debug!(
            "Rewrote part with {} merge queries ({} created)",
            merges.len(),
            created
        );
        Ok(Part {
            term: Term::Merge(MergeTerm::new(pre, merges, post)),
            ..part.clone()
        })
    }
}

/// Left fold of the given terms with `and`
fn conjunction(terms: &[&Term]) -> Term {
    terms
        .iter()
        .fold(Term::All, |acc, term| acc.and((*term).clone()))
}

impl Part {
    /// Merge queries this part needs to provide the given ancestor or
    /// descendant paths.
    pub fn merge_queries_for(&self, paths: &[&str]) -> Result<Vec<MergeQuery>> {
        AncestorRewriter::default().merge_queries_for(self, paths)
    }
}

impl Query {
    /// Add merge queries for every ancestor or descendant path this query
    /// filters on, plus the `additional` paths.
    pub fn rewrite_for_ancestors_descendants(&self, additional: &[&str]) -> Result<Query> {
        AncestorRewriter::default().rewrite(self, additional)
    }
}
