//! Finding the nodes that fire under a set of outcomes.
//!
//! Rendering and resolution ask questions like "which effects apply on a
//! critical hit?". The answer is collected by walking the nested tree rather
//! than a flat list, since a branch match pulls in everything nested below it.

use crate::grouping::group_nodes;
use crate::node::{ActionConsequence, Branch, DamageNode, EffectNode, NodeId};
use std::collections::HashSet;

/// Collect the nodes that fire under `contexts`.
///
/// Root nodes are included when `!include_base_nodes` and they are not damage,
/// or when `include_base_damage_nodes` and they are damage. Every node is
/// reported once, in order of discovery.
pub fn find_nodes_by_contexts<'a>(
    tree: &'a [EffectNode],
    contexts: &[Branch],
    include_base_nodes: bool,
    include_base_damage_nodes: bool,
) -> Vec<&'a EffectNode> {
    let mut collector = Collector::new(contexts);
    for node in tree {
        if node.is_root() {
            let is_damage = matches!(node, EffectNode::Damage(_));
            if (!include_base_nodes && !is_damage) || (include_base_damage_nodes && is_damage) {
                collector.push(node);
            }
        }
        collector.walk(node);
    }
    collector.found
}

/// Options for [`get_relevant_nodes`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RelevanceOptions<'a> {
    /// The complete tree, walked instead of the given slice when present.
    pub full_tree: Option<&'a [EffectNode]>,
    pub include_base_nodes: bool,
    pub include_base_damage_nodes: bool,
}

impl<'a> RelevanceOptions<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_full_tree(mut self, tree: &'a [EffectNode]) -> Self {
        self.full_tree = Some(tree);
        self
    }

    pub fn with_base_nodes(mut self, include: bool) -> Self {
        self.include_base_nodes = include;
        self
    }

    pub fn with_base_damage_nodes(mut self, include: bool) -> Self {
        self.include_base_damage_nodes = include;
        self
    }
}

/// Extract the nodes relevant to `contexts` and group them for display.
pub fn get_relevant_nodes<'a>(
    effects: &'a [EffectNode],
    contexts: &[Branch],
    options: RelevanceOptions<'a>,
) -> Vec<Vec<&'a EffectNode>> {
    let tree = options.full_tree.unwrap_or(effects);
    let nodes = find_nodes_by_contexts(
        tree,
        contexts,
        options.include_base_nodes,
        options.include_base_damage_nodes,
    );
    group_nodes(&nodes)
}

/// The nearest damage roll above the node with `id`.
///
/// A `damageOutcome` slices this roll's result. Shared rolls count as owners.
pub fn damage_source_of<'a>(tree: &'a [EffectNode], id: &NodeId) -> Option<&'a DamageNode> {
    search_nodes(tree, id, None).flatten()
}

// Outer `Some` means the node was found; the inner value is its damage source.
fn search_nodes<'a>(
    nodes: &'a [EffectNode],
    id: &NodeId,
    nearest: Option<&'a DamageNode>,
) -> Option<Option<&'a DamageNode>> {
    nodes.iter().find_map(|node| {
        if node.id() == id {
            return Some(nearest);
        }
        match node {
            EffectNode::Damage(damage) => search_damage_children(damage, id),
            EffectNode::SavingThrow(save) => save
                .shared_rolls
                .iter()
                .flatten()
                .find_map(|shared| {
                    if &shared.id == id {
                        Some(nearest)
                    } else {
                        search_damage_children(shared, id)
                    }
                })
                .or_else(|| search_branches(save.on.as_ref(), id, nearest)),
            _ => None,
        }
    })
}

fn search_damage_children<'a>(
    damage: &'a DamageNode,
    id: &NodeId,
) -> Option<Option<&'a DamageNode>> {
    search_branches(damage.on.as_ref(), id, Some(damage))
}

fn search_branches<'a>(
    on: Option<&'a ActionConsequence>,
    id: &NodeId,
    nearest: Option<&'a DamageNode>,
) -> Option<Option<&'a DamageNode>> {
    on?.branches()
        .find_map(|(_, children)| search_nodes(children, id, nearest))
}

struct Collector<'a, 'c> {
    contexts: &'c [Branch],
    found: Vec<&'a EffectNode>,
    reported: HashSet<&'a NodeId>,
    walked: HashSet<&'a NodeId>,
}

impl<'a, 'c> Collector<'a, 'c> {
    fn new(contexts: &'c [Branch]) -> Self {
        Self {
            contexts,
            found: Vec::new(),
            reported: HashSet::new(),
            walked: HashSet::new(),
        }
    }

    fn push(&mut self, node: &'a EffectNode) {
        if self.reported.insert(node.id()) {
            self.found.push(node);
        }
    }

    fn walk(&mut self, node: &'a EffectNode) {
        if !self.walked.insert(node.id()) {
            return;
        }
        match node {
            EffectNode::Damage(damage) => self.walk_damage(damage),
            EffectNode::SavingThrow(save) => {
                // Shared rolls apply once regardless of the save's outcome.
                for shared in save.shared_rolls.iter().flatten() {
                    if self.walked.insert(&shared.id) {
                        self.walk_damage(shared);
                    }
                }
                if let Some(on) = &save.on {
                    self.collect_matching(on);
                }
            }
            EffectNode::DamageOutcome(_)
            | EffectNode::Healing(_)
            | EffectNode::Condition(_)
            | EffectNode::Note(_) => {}
        }
    }

    fn walk_damage(&mut self, damage: &'a DamageNode) {
        let Some(on) = &damage.on else {
            return;
        };
        self.collect_matching(on);
        // Deeper conditional nodes apply by position, so look below every branch.
        for (_, children) in on.branches() {
            for child in children {
                self.walk(child);
            }
        }
    }

    fn collect_matching(&mut self, on: &'a ActionConsequence) {
        let contexts = self.contexts;
        for context in contexts {
            for node in on.matching(*context) {
                self.push(node);
                self.walk(node);
            }
        }
    }
}
