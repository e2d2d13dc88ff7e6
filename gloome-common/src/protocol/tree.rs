//! Tree result payload
//!
//! On the wire the tree result is a positional array:
//!
//! ```text
//! [rootNode, nodeAnnotations, nodeSortList, {"Size factor": f},
//!  branchAnnotations, branchSortList, {"Sequence length": n}]
//! ```
//!
//! Internally it is the named [`TreePayload`]; the positional order exists
//! only in the private `WireTreePayload` used by serde.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A node of the phylogenetic hierarchy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeNode {
    pub name: String,
    /// Edge length to the parent (ignored for the root)
    #[serde(default, deserialize_with = "distance_or_zero")]
    pub distance: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TreeNode>,
}

/// The root's distance is sent as `null` by some revisions of the service
fn distance_or_zero<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(0.0))
}

impl TreeNode {
    pub fn leaf(name: impl Into<String>, distance: f64) -> Self {
        Self {
            name: name.into(),
            distance,
            children: Vec::new(),
        }
    }

    pub fn with_children(name: impl Into<String>, distance: f64, children: Vec<TreeNode>) -> Self {
        Self {
            name: name.into(),
            distance,
            children,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Pre-order traversal (self first)
    pub fn iter(&self) -> impl Iterator<Item = &TreeNode> {
        let mut stack = vec![self];
        std::iter::from_fn(move || {
            let node = stack.pop()?;
            stack.extend(node.children.iter().rev());
            Some(node)
        })
    }

    pub fn node_count(&self) -> usize {
        self.iter().count()
    }

    pub fn leaf_count(&self) -> usize {
        self.iter().filter(|n| n.is_leaf()).count()
    }

    pub fn find(&self, name: &str) -> Option<&TreeNode> {
        self.iter().find(|n| n.name == name)
    }
}

/// One per-position or scalar annotation value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Number(f64),
    Text(String),
}

impl Scalar {
    /// Numeric reading of the value; text is parsed when it looks like a number
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Scalar::Number(n) => Some(*n),
            Scalar::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            Scalar::Number(n) => write!(f, "{}", n),
            Scalar::Text(s) => f.write_str(s),
        }
    }
}

/// Attribute value: a single scalar or one scalar per alignment column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnnotationValue {
    Scalar(Scalar),
    Sequence(Vec<Scalar>),
}

/// Attributes of one node or branch, keyed by attribute name
pub type AnnotationRecord = BTreeMap<String, AnnotationValue>;

/// Records keyed by node name (for branches: the name of the child node)
pub type AnnotationTable = BTreeMap<String, AnnotationRecord>;

/// Named form of the tree result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "WireTreePayload", into = "WireTreePayload")]
pub struct TreePayload {
    pub root: TreeNode,
    pub node_annotations: AnnotationTable,
    pub node_sort_list: Vec<String>,
    /// Display-size divisor computed by the service from the leaf count
    pub size_factor: f64,
    pub branch_annotations: AnnotationTable,
    pub branch_sort_list: Vec<String>,
    pub sequence_length: Option<usize>,
}

#[derive(Serialize, Deserialize)]
struct WireTreePayload(
    TreeNode,
    AnnotationTable,
    WireSortList,
    WireSizeFactor,
    AnnotationTable,
    WireSortList,
    #[serde(default)] Option<WireSequenceLength>,
);

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum WireSortList {
    Named {
        #[serde(rename = "List for sorting")]
        list: Vec<String>,
    },
    Bare(Vec<String>),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum WireSizeFactor {
    Named {
        #[serde(rename = "Size factor", alias = "sizeFactor")]
        size_factor: f64,
    },
    Bare(f64),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum WireSequenceLength {
    Named {
        #[serde(rename = "Sequence length", alias = "sequenceLength")]
        sequence_length: usize,
    },
    Bare(usize),
}

impl From<WireSortList> for Vec<String> {
    fn from(wire: WireSortList) -> Self {
        match wire {
            WireSortList::Named { list } | WireSortList::Bare(list) => list,
        }
    }
}

impl From<WireTreePayload> for TreePayload {
    fn from(wire: WireTreePayload) -> Self {
        let WireTreePayload(root, nodes, node_sort, size, branches, branch_sort, seq_len) = wire;
        let size_factor = match size {
            WireSizeFactor::Named { size_factor } | WireSizeFactor::Bare(size_factor) => size_factor,
        };
        let sequence_length = seq_len.map(|s| match s {
            WireSequenceLength::Named { sequence_length } | WireSequenceLength::Bare(sequence_length) => {
                sequence_length
            }
        });
        TreePayload {
            root,
            node_annotations: nodes,
            node_sort_list: node_sort.into(),
            size_factor,
            branch_annotations: branches,
            branch_sort_list: branch_sort.into(),
            sequence_length,
        }
    }
}

impl From<TreePayload> for WireTreePayload {
    fn from(payload: TreePayload) -> Self {
        WireTreePayload(
            payload.root,
            payload.node_annotations,
            WireSortList::Named {
                list: payload.node_sort_list,
            },
            WireSizeFactor::Named {
                size_factor: payload.size_factor,
            },
            payload.branch_annotations,
            WireSortList::Named {
                list: payload.branch_sort_list,
            },
            payload
                .sequence_length
                .map(|sequence_length| WireSequenceLength::Named { sequence_length }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TreeNode {
        TreeNode::with_children(
            "N1",
            0.0,
            vec![
                TreeNode::leaf("A", 0.1),
                TreeNode::with_children("N2", 0.2, vec![TreeNode::leaf("B", 0.3), TreeNode::leaf("C", 0.4)]),
            ],
        )
    }

    #[test]
    fn test_preorder_visits_parent_first() {
        let names: Vec<_> = sample().iter().map(|n| n.name.clone()).collect();
        assert_eq!(names, vec!["N1", "A", "N2", "B", "C"]);
    }

    #[test]
    fn test_counts() {
        let root = sample();
        assert_eq!(root.node_count(), 5);
        assert_eq!(root.leaf_count(), 3);
        assert_eq!(root.find("N2").map(|n| n.children.len()), Some(2));
        assert!(root.find("Z").is_none());
    }

    #[test]
    fn test_scalar_display() {
        assert_eq!(Scalar::Number(3.0).to_string(), "3");
        assert_eq!(Scalar::Number(0.25).to_string(), "0.25");
        assert_eq!(Scalar::Text("A".into()).to_string(), "A");
        assert_eq!(Scalar::Text("0.7".into()).as_number(), Some(0.7));
    }

    #[test]
    fn test_node_ignores_extra_fields() {
        let node: TreeNode =
            serde_json::from_str(r#"{"name": "A", "distance": 0.5, "info": "leaf"}"#).unwrap();
        assert_eq!(node, TreeNode::leaf("A", 0.5));
    }
}
