//! Flattening an effect tree into an arena and rebuilding it.
//!
//! The flat list is the working form for anything that visits every node in
//! order (roll evaluation, delta application). Each entry is a detached copy:
//! its child buckets are emptied, and its `parentNode`/`parentContext` links
//! are enough to put it back.

use crate::node::{ActionConsequence, Branch, DamageNode, EffectNode, NodeId, SavingThrowNode};
use std::collections::HashMap;
use thiserror::Error;
use tracing::warn;

/// Structural problems found while rebuilding a tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("Node '{node}' references missing parent '{parent}'")]
    DanglingParent { node: NodeId, parent: NodeId },

    #[error("Node '{node}' has a parent but no parent context")]
    MissingContext { node: NodeId },

    #[error("Duplicate node id '{0}'")]
    DuplicateId(NodeId),

    #[error("Node '{node}' cannot live under '{branch}' of {owner_type} node '{owner}'")]
    InvalidBranch {
        node: NodeId,
        owner: NodeId,
        owner_type: &'static str,
        branch: Branch,
    },

    #[error("Node '{0}' is not reachable from any root (parent cycle)")]
    Unreachable(NodeId),
}

type Link<'a> = Option<(Branch, &'a NodeId)>;

/// Flatten a tree (or any subtree) into depth-first pre-order.
///
/// Order per owner: the node, its shared rolls, then its branches in
/// canonical order. The input is not modified.
pub fn flatten(effects: &[EffectNode]) -> Vec<EffectNode> {
    let mut flat = Vec::new();
    for node in effects {
        push_node(node, link_of(node), &mut flat);
    }
    flat
}

fn link_of(node: &EffectNode) -> Link<'_> {
    match (node.parent_context(), node.parent_node()) {
        (Some(branch), Some(parent)) => Some((branch, parent)),
        _ => None,
    }
}

fn push_node(node: &EffectNode, link: Link<'_>, flat: &mut Vec<EffectNode>) {
    flat.push(stamped(node.detached(), link));

    if let EffectNode::SavingThrow(save) = node {
        for shared in save.shared_rolls.iter().flatten() {
            push_damage(shared, (Branch::SharedRolls, &save.id), flat);
        }
    }
    push_children(node.id(), node.consequence(), flat);
}

fn push_damage(damage: &DamageNode, link: (Branch, &NodeId), flat: &mut Vec<EffectNode>) {
    flat.push(stamped(EffectNode::Damage(damage.detached()), Some(link)));
    push_children(&damage.id, damage.on.as_ref(), flat);
}

fn push_children(
    owner: &NodeId,
    on: Option<&ActionConsequence>,
    flat: &mut Vec<EffectNode>,
) {
    let Some(on) = on else {
        return;
    };
    for (branch, children) in on.branches() {
        for child in children {
            push_node(child, Some((branch, owner)), flat);
        }
    }
}

/// Make the stored links agree with the node's position in the tree.
fn stamped(mut node: EffectNode, link: Link<'_>) -> EffectNode {
    let expected_context = link.map(|(branch, _)| branch);
    let expected_parent = link.map(|(_, parent)| parent);
    if node.parent_context() != expected_context || node.parent_node() != expected_parent {
        warn!(
            node = %node.id(),
            stored_context = ?node.parent_context(),
            stored_parent = ?node.parent_node(),
            expected_context = ?expected_context,
            expected_parent = ?expected_parent,
            "Effect node links disagree with its position; using position"
        );
        node.set_link(link.map(|(branch, parent)| (branch, parent.clone())));
    }
    node
}

/// Rebuild the nested tree from a flat list.
///
/// Roots keep flat-list order; children are appended to their owner's bucket
/// in flat-list order. Owners may appear after their children.
pub fn reconstruct(flat: Vec<EffectNode>) -> Result<Vec<EffectNode>, TreeError> {
    let mut index: HashMap<NodeId, usize> = HashMap::with_capacity(flat.len());
    for (position, node) in flat.iter().enumerate() {
        if index.insert(node.id().clone(), position).is_some() {
            return Err(TreeError::DuplicateId(node.id().clone()));
        }
    }

    let mut roots = Vec::new();
    let mut children: HashMap<usize, Vec<(Branch, usize)>> = HashMap::new();
    for (position, node) in flat.iter().enumerate() {
        match (node.parent_node(), node.parent_context()) {
            (None, context) => {
                if context.is_some() {
                    warn!(node = %node.id(), "Root effect node has a parent context; ignoring it");
                }
                roots.push(position);
            }
            (Some(parent), Some(branch)) => {
                let owner = index.get(parent).ok_or_else(|| TreeError::DanglingParent {
                    node: node.id().clone(),
                    parent: parent.clone(),
                })?;
                children.entry(*owner).or_default().push((branch, position));
            }
            (Some(_), None) => {
                return Err(TreeError::MissingContext {
                    node: node.id().clone(),
                })
            }
        }
    }

    let ids: Vec<NodeId> = flat.iter().map(|node| node.id().clone()).collect();
    let mut slots: Vec<Option<EffectNode>> = flat.into_iter().map(Some).collect();
    let tree = roots
        .into_iter()
        .map(|root| build(root, &mut slots, &ids, &children))
        .collect::<Result<Vec<_>, _>>()?;

    if let Some(orphan) = slots.iter().flatten().next() {
        return Err(TreeError::Unreachable(orphan.id().clone()));
    }
    Ok(tree)
}

fn build(
    position: usize,
    slots: &mut [Option<EffectNode>],
    ids: &[NodeId],
    children: &HashMap<usize, Vec<(Branch, usize)>>,
) -> Result<EffectNode, TreeError> {
    let mut node = slots[position]
        .take()
        .ok_or_else(|| TreeError::Unreachable(ids[position].clone()))?;
    node.clear_children();

    for &(branch, child_position) in children.get(&position).into_iter().flatten() {
        let child = build(child_position, slots, ids, children)?;
        attach(&mut node, branch, child)?;
    }
    Ok(node)
}

fn attach(owner: &mut EffectNode, branch: Branch, child: EffectNode) -> Result<(), TreeError> {
    let invalid = TreeError::InvalidBranch {
        node: child.id().clone(),
        owner: owner.id().clone(),
        owner_type: owner.type_name(),
        branch,
    };

    match owner {
        EffectNode::SavingThrow(save) if branch == Branch::SharedRolls => match child {
            EffectNode::Damage(damage) => {
                save.shared_rolls.get_or_insert_with(Vec::new).push(damage);
                Ok(())
            }
            _ => Err(invalid),
        },
        EffectNode::Damage(DamageNode { on, .. })
        | EffectNode::SavingThrow(SavingThrowNode { on, .. }) => {
            match on.get_or_insert_with(Default::default).branch_mut(branch) {
                Some(bucket) => {
                    bucket.push(child);
                    Ok(())
                }
                None => Err(invalid),
            }
        }
        _ => Err(invalid),
    }
}
