//! Aggregation clause: `aggregate(group_vars: functions):`

use cinder_core::value::write_quoted;
use cinder_core::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Piece of a group variable template such as `"{a.name}_{a.id}"`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TemplatePart {
    Text(String),
    Path(String),
}

/// Source of a group variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GroupSource {
    Path(String),
    Template(Vec<TemplatePart>),
}

impl GroupSource {
    /// Split a template string into literal text and `{path}` placeholders
    pub fn template(text: &str) -> Self {
        let mut parts = Vec::new();
        let mut rest = text;
        while let Some(open) = rest.find('{') {
            let Some(close) = rest[open..].find('}') else {
                break;
            };
            if open > 0 {
                parts.push(TemplatePart::Text(rest[..open].to_string()));
            }
            parts.push(TemplatePart::Path(rest[open + 1..open + close].trim().to_string()));
            rest = &rest[open + close + 1..];
        }
        if !rest.is_empty() {
            parts.push(TemplatePart::Text(rest.to_string()));
        }
        GroupSource::Template(parts)
    }

    fn template_text(parts: &[TemplatePart]) -> String {
        parts
            .iter()
            .map(|part| match part {
                TemplatePart::Text(text) => text.clone(),
                TemplatePart::Path(path) => format!("{{{path}}}"),
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateVariable {
    pub source: GroupSource,
    pub as_name: Option<String>,
}

impl AggregateVariable {
    pub fn path(path: impl Into<String>) -> Self {
        Self {
            source: GroupSource::Path(path.into()),
            as_name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.as_name = Some(name.into());
        self
    }

    fn property_paths(&self) -> Vec<&str> {
        match &self.source {
            GroupSource::Path(path) => vec![path.as_str()],
            GroupSource::Template(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    TemplatePart::Path(path) => Some(path.as_str()),
                    TemplatePart::Text(_) => None,
                })
                .collect(),
        }
    }

    fn change_paths(&self, f: &dyn Fn(&str) -> String) -> Self {
        let source = match &self.source {
            GroupSource::Path(path) => GroupSource::Path(f(path)),
            GroupSource::Template(parts) => GroupSource::Template(
                parts
                    .iter()
                    .map(|part| match part {
                        TemplatePart::Path(path) => TemplatePart::Path(f(path)),
                        text => text.clone(),
                    })
                    .collect(),
            ),
        };
        Self {
            source,
            as_name: self.as_name.clone(),
        }
    }
}

impl fmt::Display for AggregateVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            GroupSource::Path(path) => f.write_str(path)?,
            GroupSource::Template(parts) => write_quoted(f, &GroupSource::template_text(parts))?,
        }
        if let Some(name) = &self.as_name {
            write!(f, " as {name}")?;
        }
        Ok(())
    }
}

/// Aggregation operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateOp {
    Sum,
    Count,
    Min,
    Max,
    Avg,
}

impl AggregateOp {
    pub fn as_str(self) -> &'static str {
        match self {
            AggregateOp::Sum => "sum",
            AggregateOp::Count => "count",
            AggregateOp::Min => "min",
            AggregateOp::Max => "max",
            AggregateOp::Avg => "avg",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "sum" => Some(AggregateOp::Sum),
            "count" => Some(AggregateOp::Count),
            "min" => Some(AggregateOp::Min),
            "max" => Some(AggregateOp::Max),
            "avg" => Some(AggregateOp::Avg),
            _ => None,
        }
    }
}

/// What an aggregate function is applied to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AggregateTarget {
    Path(String),
    /// A number, e.g. `sum(1)` counts the members of a group
    Constant(Value),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateFunction {
    pub op: AggregateOp,
    pub target: AggregateTarget,
    pub as_name: Option<String>,
}

impl AggregateFunction {
    pub fn new(op: AggregateOp, target: AggregateTarget) -> Self {
        Self {
            op,
            target,
            as_name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.as_name = Some(name.into());
        self
    }
}

impl fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.op.as_str())?;
        match &self.target {
            AggregateTarget::Path(path) => f.write_str(path)?,
            AggregateTarget::Constant(value) => write!(f, "{value}")?,
        }
        f.write_str(")")?;
        if let Some(name) = &self.as_name {
            write!(f, " as {name}")?;
        }
        Ok(())
    }
}

/// Group the result of a query and compute aggregate functions per group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregate {
    pub group_by: Vec<AggregateVariable>,
    pub functions: Vec<AggregateFunction>,
}

impl Aggregate {
    pub fn new(group_by: Vec<AggregateVariable>, functions: Vec<AggregateFunction>) -> Self {
        Self {
            group_by,
            functions,
        }
    }

    /// Every property path used by group variables and functions
    pub fn property_paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self
            .group_by
            .iter()
            .flat_map(AggregateVariable::property_paths)
            .collect();
        paths.extend(self.functions.iter().filter_map(|func| match &func.target {
            AggregateTarget::Path(path) => Some(path.as_str()),
            AggregateTarget::Constant(_) => None,
        }));
        paths
    }

    pub fn change_paths(&self, f: &dyn Fn(&str) -> String) -> Self {
        Self {
            group_by: self.group_by.iter().map(|v| v.change_paths(f)).collect(),
            functions: self
                .functions
                .iter()
                .map(|func| AggregateFunction {
                    op: func.op,
                    target: match &func.target {
                        AggregateTarget::Path(path) => AggregateTarget::Path(f(path)),
                        constant => constant.clone(),
                    },
                    as_name: func.as_name.clone(),
                })
                .collect(),
        }
    }
}

impl fmt::Display for Aggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("aggregate(")?;
        for (idx, var) in self.group_by.iter().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{var}")?;
        }
        if !self.group_by.is_empty() {
            f.write_str(": ")?;
        }
        for (idx, func) in self.functions.iter().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{func}")?;
        }
        f.write_str("):")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_query;
    use std::collections::BTreeSet;

    #[test]
    fn test_template() {
        let source = GroupSource::template("{a.a}_{a.b}");
        assert_eq!(
            source,
            GroupSource::Template(vec![
                TemplatePart::Path("a.a".into()),
                TemplatePart::Text("_".into()),
                TemplatePart::Path("a.b".into()),
            ])
        );
        let plain = GroupSource::template("no placeholder");
        assert_eq!(
            plain,
            GroupSource::Template(vec![TemplatePart::Text("no placeholder".into())])
        );
    }

    #[test]
    fn test_property_paths() {
        let query = parse_query(r#"aggregate("{a.a}_{a.b}" as a, a.c.d as v: sum(a.c.e) as c): all"#).unwrap();
        let aggregate = query.aggregate().unwrap();
        let paths: BTreeSet<&str> = aggregate.property_paths().into_iter().collect();
        assert_eq!(paths, BTreeSet::from(["a.a", "a.b", "a.c.d", "a.c.e"]));
    }

    #[test]
    fn test_render() {
        let aggregate = Aggregate::new(
            vec![
                AggregateVariable::path("kind"),
                AggregateVariable {
                    source: GroupSource::template("{cloud}/{region}"),
                    as_name: Some("location".into()),
                },
            ],
            vec![
                AggregateFunction::new(AggregateOp::Sum, AggregateTarget::Constant(Value::Integer(1)))
                    .with_name("count"),
                AggregateFunction::new(AggregateOp::Max, AggregateTarget::Path("cpu".into())),
            ],
        );
        assert_eq!(
            aggregate.to_string(),
            r#"aggregate(kind, "{cloud}/{region}" as location: sum(1) as count, max(cpu)):"#
        );
        let ungrouped = Aggregate::new(
            vec![],
            vec![AggregateFunction::new(AggregateOp::Avg, AggregateTarget::Path("mem".into()))],
        );
        assert_eq!(ungrouped.to_string(), "aggregate(avg(mem)):");
    }

    #[test]
    fn test_change_paths() {
        let query = parse_query(r#"aggregate("{a}_{b}", c: sum(d), count(1)): all"#).unwrap();
        let changed = query
            .aggregate()
            .unwrap()
            .change_paths(&|p| format!("r.{p}"));
        assert_eq!(
            changed.to_string(),
            r#"aggregate("{r.a}_{r.b}", r.c: sum(r.d), count(1)):"#
        );
    }
}
