//! Clustering extracted nodes into units that are rendered or resolved together.

use crate::node::{Branch, EffectNode, NodeId};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum GroupKey<'a> {
    /// A rollable node and the outcome slices of its roll.
    Roll(&'a NodeId),
    /// Non-rollable siblings under the same owner branch.
    Branch(Option<&'a NodeId>, Option<Branch>),
}

/// Group nodes for display.
///
/// Each rollable node (damage, healing, saving throw) opens its own group. A
/// non-rollable node whose owner is a damage node in `nodes` joins that
/// node's group. Remaining nodes cluster by `(parentNode, parentContext)`.
/// Groups are ordered by their first member; members keep input order.
pub fn group_nodes<'a>(nodes: &[&'a EffectNode]) -> Vec<Vec<&'a EffectNode>> {
    let present: HashMap<&NodeId, &EffectNode> =
        nodes.iter().map(|node| (node.id(), *node)).collect();

    let mut groups: Vec<Vec<&'a EffectNode>> = Vec::new();
    let mut slots: HashMap<GroupKey<'a>, usize> = HashMap::new();
    for &node in nodes {
        let key = group_key(node, &present);
        match slots.get(&key) {
            Some(&slot) => groups[slot].push(node),
            None => {
                slots.insert(key, groups.len());
                groups.push(vec![node]);
            }
        }
    }
    groups
}

fn group_key<'a>(node: &'a EffectNode, present: &HashMap<&NodeId, &EffectNode>) -> GroupKey<'a> {
    if node.is_rollable() {
        return GroupKey::Roll(node.id());
    }
    if let Some(parent) = node.parent_node() {
        if matches!(present.get(parent), Some(EffectNode::Damage(_))) {
            return GroupKey::Roll(parent);
        }
    }
    GroupKey::Branch(node.parent_node(), node.parent_context())
}
