//! Section rewriting of property paths
//!
//! Users write paths relative to a section (`reported` by default). A path
//! with a leading `/` is anchored at the root of the node instead.

use crate::ancestors::AncestorRewriter;
use crate::query::Query;
use cinder_core::{Result, Section};
use tracing::debug;

/// Absolute path of `path` written relative to `section`
pub fn section_path(section: &str, path: &str) -> String {
    if let Some(absolute) = path.strip_prefix(Section::PATH_ROOT) {
        absolute.to_string()
    } else if Section::is_root(section) {
        path.to_string()
    } else {
        format!("{section}.{path}")
    }
}

/// Path relative to `section` of the absolute `path`.
///
/// Paths outside of the section get the root marker.
pub fn relative_path(section: &str, path: &str) -> String {
    if Section::is_root(section) {
        return path.to_string();
    }
    match path.strip_prefix(section).and_then(|rest| rest.strip_prefix('.')) {
        Some(relative) => relative.to_string(),
        None => format!("{}{path}", Section::PATH_ROOT),
    }
}

impl Query {
    /// Interpret all paths relative to `section` and turn references to
    /// ancestor or descendant properties into merge queries.
    pub fn on_section(&self, section: &str) -> Result<Query> {
        self.on_section_with(section, &AncestorRewriter::default())
    }

    pub fn on_section_with(&self, section: &str, rewriter: &AncestorRewriter) -> Result<Query> {
        debug!("Rewriting query on section {}", section);
        let absolute = self.change_paths(&|path| section_path(section, path));
        rewriter.rewrite(&absolute, &[])
    }

    /// Inverse of [`Query::on_section`] for paths that live in `section`
    pub fn relative_to_section(&self, section: &str) -> Query {
        self.change_paths(&|path| relative_path(section, path))
    }
}
