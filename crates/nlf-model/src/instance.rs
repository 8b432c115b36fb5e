//! Concrete parameter trees produced by the model mapper.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// One entry of an [`Instance`]: a resolved value or a nested instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", content = "spec", rename_all = "kebab-case")]
pub enum InstanceNode {
    /// A resolved numeric parameter.
    Value(f64),
    /// A nested component instance.
    Instance(Instance),
}

/// A model with every prior resolved to a numeric value.
///
/// Instances mirror the shape of the [`crate::Model`] they were mapped from
/// and are created fresh for each likelihood evaluation; the evaluation owns
/// its instance exclusively.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Instance {
    components: IndexMap<String, InstanceNode>,
}

impl Instance {
    /// Creates an empty instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a resolved value component.
    pub fn insert_value(&mut self, name: impl Into<String>, value: f64) {
        self.components
            .insert(name.into(), InstanceNode::Value(value));
    }

    /// Adds a nested component instance.
    pub fn insert_instance(&mut self, name: impl Into<String>, instance: Instance) {
        self.components
            .insert(name.into(), InstanceNode::Instance(instance));
    }

    /// Returns the named component, if present.
    pub fn component(&self, name: &str) -> Option<&InstanceNode> {
        self.components.get(name)
    }

    /// Iterates over components in declaration order.
    pub fn components(&self) -> impl Iterator<Item = (&String, &InstanceNode)> {
        self.components.iter()
    }

    /// Resolves a dotted parameter path to its numeric value.
    pub fn value_at(&self, path: &str) -> Option<f64> {
        let (head, rest) = match path.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (path, None),
        };
        match (self.components.get(head), rest) {
            (Some(InstanceNode::Value(value)), None) => Some(*value),
            (Some(InstanceNode::Instance(sub)), Some(rest)) => sub.value_at(rest),
            _ => None,
        }
    }

    /// Flattens the instance to its values in model traversal order.
    pub fn values(&self) -> Vec<f64> {
        let mut out = Vec::new();
        self.collect_values(&mut out);
        out
    }

    fn collect_values(&self, out: &mut Vec<f64>) {
        for node in self.components.values() {
            match node {
                InstanceNode::Value(value) => out.push(*value),
                InstanceNode::Instance(sub) => sub.collect_values(out),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_at_walks_nested_components() {
        let mut inner = Instance::new();
        inner.insert_value("centre", 5.0);
        let mut outer = Instance::new();
        outer.insert_instance("gaussian", inner);
        outer.insert_value("offset", 1.0);

        assert_eq!(outer.value_at("gaussian.centre"), Some(5.0));
        assert_eq!(outer.value_at("offset"), Some(1.0));
        assert_eq!(outer.value_at("gaussian"), None);
        assert_eq!(outer.values(), vec![5.0, 1.0]);
    }
}
