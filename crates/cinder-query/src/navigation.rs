//! Edge traversals between the parts of a query

use cinder_core::{Direction, EdgeType, Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A directed, bounded-depth edge traversal.
///
/// `until == None` means the traversal is unbounded above. The default is a
/// single outbound hop over an edge type that is filled in at parse time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Navigation {
    pub start: usize,
    pub until: Option<usize>,
    pub edge_type: Option<String>,
    pub direction: Direction,
}

impl Default for Navigation {
    fn default() -> Self {
        Self::new(Direction::Outbound)
    }
}

impl Navigation {
    /// Single hop in the given direction
    pub fn new(direction: Direction) -> Self {
        Self {
            start: 1,
            until: Some(1),
            edge_type: None,
            direction,
        }
    }

    /// Traversal from a node up to all of its ancestors over default edges
    pub fn until_root() -> Self {
        Self {
            start: 1,
            until: None,
            edge_type: Some(EdgeType::DEFAULT.to_string()),
            direction: Direction::Inbound,
        }
    }

    /// Traversal from a node down to all of its descendants over default edges
    pub fn until_leaf() -> Self {
        Self {
            direction: Direction::Outbound,
            ..Self::until_root()
        }
    }

    /// Set the hop range. Fails if `start` lies beyond `until`.
    pub fn with_range(mut self, start: usize, until: Option<usize>) -> Result<Self> {
        if let Some(until) = until {
            if start > until {
                return Err(Error::parse(
                    0,
                    format!("Invalid navigation range [{start}:{until}]: start is greater than until"),
                ));
            }
        }
        self.start = start;
        self.until = until;
        Ok(self)
    }

    pub fn with_edge_type(mut self, edge_type: impl Into<String>) -> Self {
        self.edge_type = Some(edge_type.into());
        self
    }

    /// Returns true if this is the implicit single hop range
    pub fn is_single_hop(&self) -> bool {
        self.start == 1 && self.until == Some(1)
    }

    /// Set the edge type if none has been given explicitly
    pub(crate) fn fill_edge_type(&mut self, edge_type: &str) {
        if self.edge_type.is_none() {
            self.edge_type = Some(edge_type.to_string());
        }
    }

    fn fmt_edge_and_range(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(edge_type) = &self.edge_type {
            f.write_str(edge_type)?;
        }
        match self.until {
            _ if self.is_single_hop() => Ok(()),
            None => write!(f, "[{}:]", self.start),
            Some(until) if until == self.start => write!(f, "[{until}]"),
            Some(until) => write!(f, "[{}:{}]", self.start, until),
        }
    }
}

impl fmt::Display for Navigation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.direction {
            Direction::Outbound => {
                f.write_str("-")?;
                self.fmt_edge_and_range(f)?;
                f.write_str("->")
            }
            Direction::Inbound => {
                f.write_str("<-")?;
                self.fmt_edge_and_range(f)?;
                f.write_str("-")
            }
            Direction::Both => {
                f.write_str("-")?;
                self.fmt_edge_and_range(f)?;
                f.write_str("-")
            }
        }
    }
}
