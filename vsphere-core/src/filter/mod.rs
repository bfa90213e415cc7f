//! Inventory filter applied while walking the object tree.
//!
//! A filter decides, from the datacenter and cluster of a candidate node,
//! whether the walk descends into it. Rejected clusters cost no further
//! API calls.

use crate::error::{Result, VsphereError};
use serde::{Deserialize, Serialize};

mod expr;

pub use expr::{Expression, FilterContext};

/// What to do with a node whose filter evaluation failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterErrorPolicy {
    /// Keep the node so a broken expression never hides an environment
    #[default]
    Keep,
    /// Drop the node
    Drop,
}

#[derive(Debug, Clone)]
enum Predicate {
    KeepAll,
    Expr { source: String, expression: Expression },
}

/// Compiled inventory filter.
#[derive(Debug, Clone)]
pub struct InventoryFilter {
    predicate: Predicate,
    on_error: FilterErrorPolicy,
}

impl InventoryFilter {
    /// Filter that keeps every node.
    pub fn keep_all() -> Self {
        Self { predicate: Predicate::KeepAll, on_error: FilterErrorPolicy::Keep }
    }

    /// Compile `source`. An empty expression keeps every node.
    pub fn new(source: &str) -> Result<Self> {
        let trimmed = source.trim();
        if trimmed.is_empty() {
            return Ok(Self::keep_all());
        }
        let expression = Expression::compile(trimmed).map_err(|reason| {
            VsphereError::FilterCompile { expression: trimmed.to_string(), reason }
        })?;
        Ok(Self {
            predicate: Predicate::Expr { source: trimmed.to_string(), expression },
            on_error: FilterErrorPolicy::Keep,
        })
    }

    pub fn with_error_policy(mut self, on_error: FilterErrorPolicy) -> Self {
        self.on_error = on_error;
        self
    }

    pub fn is_keep_all(&self) -> bool {
        matches!(self.predicate, Predicate::KeepAll)
    }

    /// Decide whether to keep a node.
    ///
    /// An evaluation failure yields the error policy's verdict together with
    /// the error, so the caller can log it.
    pub fn keep(&self, ctx: &FilterContext<'_>) -> (bool, Option<VsphereError>) {
        match &self.predicate {
            Predicate::KeepAll => (true, None),
            Predicate::Expr { source, expression } => match expression.evaluate(ctx) {
                Ok(keep) => (keep, None),
                Err(reason) => (
                    self.on_error == FilterErrorPolicy::Keep,
                    Some(VsphereError::FilterEval { expression: source.clone(), reason }),
                ),
            },
        }
    }
}

impl Default for InventoryFilter {
    fn default() -> Self {
        Self::keep_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_expression_keeps_all() {
        let filter = InventoryFilter::new("  ").unwrap();
        assert!(filter.is_keep_all());
        let (keep, err) = filter.keep(&FilterContext::default());
        assert!(keep);
        assert!(err.is_none());
    }

    #[test]
    fn test_compile_failure_is_reported_immediately() {
        let err = InventoryFilter::new("Datacenter ==").unwrap_err();
        assert!(matches!(err, VsphereError::FilterCompile { .. }));
    }

    #[test]
    fn test_evaluation_failure_fails_open() {
        let filter = InventoryFilter::new("Datacenter matches Cluster").unwrap();
        let (keep, err) = filter.keep(&FilterContext { datacenter: "dc", cluster: "[" });
        assert!(keep);
        assert!(matches!(err, Some(VsphereError::FilterEval { .. })));
    }

    #[test]
    fn test_deep_nesting_is_a_compile_error() {
        let source = format!("{}Cluster == 'c'{}", "(".repeat(5_000), ")".repeat(5_000));
        let err = InventoryFilter::new(&source).unwrap_err();
        assert!(matches!(err, VsphereError::FilterCompile { .. }));
    }

    #[test]
    fn test_evaluation_failure_can_drop() {
        let filter = InventoryFilter::new("Datacenter matches Cluster")
            .unwrap()
            .with_error_policy(FilterErrorPolicy::Drop);
        let (keep, err) = filter.keep(&FilterContext { datacenter: "dc", cluster: "[" });
        assert!(!keep);
        assert!(err.is_some());
    }

    #[test]
    fn test_expression_verdicts() {
        let filter = InventoryFilter::new("Datacenter == 'foo dc'").unwrap();
        assert!(filter.keep(&FilterContext { datacenter: "foo dc", cluster: "" }).0);
        assert!(!filter.keep(&FilterContext { datacenter: "bar dc", cluster: "" }).0);
    }
}
