//! Graph model vocabulary
//!
//! Names the query front end shares with the graph model: traversal
//! directions, edge types, sections and the ancestor/descendant namespaces.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Direction of an edge traversal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Follow edges from source to target (-->)
    Outbound,
    /// Follow edges from target to source (<--)
    Inbound,
    /// Follow edges in both directions (--)
    Both,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Direction::Outbound => "out",
            Direction::Inbound => "in",
            Direction::Both => "inout",
        };
        f.write_str(name)
    }
}

/// Edge types known to the graph model
pub struct EdgeType;

impl EdgeType {
    /// Structural edges: cloud -> account -> region -> resource
    pub const DEFAULT: &'static str = "default";

    /// Edges that define the order in which resources can be deleted
    pub const DELETE: &'static str = "delete";

    /// All edge types a query may traverse
    pub fn allowed() -> BTreeSet<String> {
        [Self::DEFAULT, Self::DELETE]
            .into_iter()
            .map(str::to_string)
            .collect()
    }
}

/// Sections of a node that property paths are rooted at
pub struct Section;

impl Section {
    /// Marker for the absolute root of a node. As a path prefix it anchors a
    /// path at the root instead of the current section.
    pub const PATH_ROOT: &'static str = "/";

    pub const REPORTED: &'static str = "reported";

    /// Returns true if the given section denotes the absolute root
    pub fn is_root(section: &str) -> bool {
        section.is_empty() || section == Self::PATH_ROOT
    }
}

/// Namespaces under which properties of related nodes are addressed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kinship {
    /// `ancestors.<kind>.<path>`: a transitive predecessor of the given kind
    Ancestors,
    /// `descendants.<kind>.<path>`: a transitive successor of the given kind
    Descendants,
}

impl Kinship {
    /// The first path segment of this namespace
    pub fn namespace(self) -> &'static str {
        match self {
            Kinship::Ancestors => "ancestors",
            Kinship::Descendants => "descendants",
        }
    }

    /// Direction to walk from a node to reach its relatives
    pub fn direction(self) -> Direction {
        match self {
            Kinship::Ancestors => Direction::Inbound,
            Kinship::Descendants => Direction::Outbound,
        }
    }

    /// Detect the namespace of a property path
    pub fn of_path(path: &str) -> Option<Self> {
        let (head, _) = path.split_once('.')?;
        match head {
            "ancestors" => Some(Kinship::Ancestors),
            "descendants" => Some(Kinship::Descendants),
            _ => None,
        }
    }
}

/// Kinds whose identifying properties the graph copies onto every descendant
pub const RESOLVED_ANCESTOR_KINDS: [&str; 4] = ["cloud", "account", "region", "zone"];

/// Ancestor properties that are materialized on every node and therefore can
/// be filtered without merging the ancestor.
pub fn resolved_ancestor_properties() -> BTreeSet<String> {
    RESOLVED_ANCESTOR_KINDS
        .iter()
        .flat_map(|kind| {
            ["name", "id"]
                .into_iter()
                .map(move |prop| format!("ancestors.{kind}.reported.{prop}"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_edge_types() {
        let allowed = EdgeType::allowed();
        assert!(allowed.contains(EdgeType::DEFAULT));
        assert!(allowed.contains(EdgeType::DELETE));
        assert_eq!(allowed.len(), 2);
    }

    #[test]
    fn test_section_root() {
        assert!(Section::is_root("/"));
        assert!(Section::is_root(""));
        assert!(!Section::is_root(Section::REPORTED));
    }

    #[test]
    fn test_kinship_of_path() {
        assert_eq!(Kinship::of_path("ancestors.cloud.reported.name"), Some(Kinship::Ancestors));
        assert_eq!(Kinship::of_path("descendants.volume.reported.size"), Some(Kinship::Descendants));
        assert_eq!(Kinship::of_path("reported.name"), None);
        assert_eq!(Kinship::of_path("ancestors"), None);
        assert_eq!(Kinship::Ancestors.direction(), Direction::Inbound);
        assert_eq!(Kinship::Descendants.direction(), Direction::Outbound);
    }

    #[test]
    fn test_resolved_properties() {
        let resolved = resolved_ancestor_properties();
        assert!(resolved.contains("ancestors.cloud.reported.name"));
        assert!(resolved.contains("ancestors.zone.reported.id"));
        assert!(!resolved.contains("ancestors.cloud.reported.kind"));
        assert_eq!(resolved.len(), 8);
    }
}
