//! Structural properties of effect trees: flatten/reconstruct round trips,
//! JSON compatibility and grouping stability.

use effects_core::node::{
    ConditionNode, DamageNode, DamageOutcome, DamageOutcomeNode, HealingNode, HealingType,
    NoteNode, SavingThrowNode,
};
use effects_core::{
    find_nodes_by_contexts, flatten, group_nodes, reconstruct, Branch, EffectNode, NodeId,
    TreeError,
};
use proptest::prelude::*;
use serde_json::json;

/// Build a well-formed tree from random placement instructions.
///
/// Each step adds one node, either as a root or under an existing damage or
/// saving throw node.
fn build_tree(steps: &[(usize, usize, usize)]) -> Vec<EffectNode> {
    let mut arena: Vec<EffectNode> = Vec::new();

    for (i, &(owner_pick, branch_pick, kind_pick)) in steps.iter().enumerate() {
        let owners: Vec<usize> = arena
            .iter()
            .enumerate()
            .filter(|(_, n)| matches!(n, EffectNode::Damage(_) | EffectNode::SavingThrow(_)))
            .map(|(i, _)| i)
            .collect();

        let link = match owner_pick % (owners.len() + 1) {
            pick if pick == owners.len() => None,
            pick => {
                let owner = &arena[owners[pick]];
                let branch = match owner {
                    EffectNode::SavingThrow(_) => [
                        Branch::PassedSave,
                        Branch::FailedSave,
                        Branch::FailedSaveBy(2),
                        Branch::FailedSaveBy(5),
                        Branch::SharedRolls,
                    ][branch_pick % 5],
                    _ => [Branch::CriticalHit, Branch::Hit, Branch::Miss][branch_pick % 3],
                };
                Some((branch, owner.id().clone()))
            }
        };

        let id = NodeId::new(format!("n{i}"));
        let kind = match link {
            Some((Branch::SharedRolls, _)) => 0,
            _ => kind_pick % 6,
        };
        let mut node: EffectNode = match kind {
            0 => DamageNode::new(id, "fire", "1d6").into(),
            1 => DamageOutcomeNode::new(id, DamageOutcome::HalfDamage).into(),
            2 => HealingNode::new(id, HealingType::Healing, "1d8").into(),
            3 => SavingThrowNode::new(id, "dexterity").with_dc(12).into(),
            4 => ConditionNode::new(id, "prone").into(),
            _ => NoteNode::new(id, "flavor", "sparks").into(),
        };
        node.set_link(link);
        arena.push(node);
    }

    match reconstruct(arena) {
        Ok(tree) => tree,
        Err(err) => panic!("generated arena must be well formed: {err}"),
    }
}

fn steps() -> impl Strategy<Value = Vec<(usize, usize, usize)>> {
    prop::collection::vec((0usize..16, 0usize..16, 0usize..16), 0..40)
}

proptest! {
    #[test]
    fn reconstruct_inverts_flatten(steps in steps()) {
        let tree = build_tree(&steps);
        let flat = flatten(&tree);
        prop_assert_eq!(flat.len(), steps.len());
        prop_assert_eq!(reconstruct(flat).unwrap(), tree);
    }

    #[test]
    fn flatten_survives_json(steps in steps()) {
        let tree = build_tree(&steps);
        let json = serde_json::to_string(&flatten(&tree)).unwrap();
        let flat: Vec<EffectNode> = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(reconstruct(flat).unwrap(), tree);
    }

    #[test]
    fn grouping_is_idempotent(steps in steps(), all_contexts in any::<bool>()) {
        let tree = build_tree(&steps);
        let contexts = if all_contexts {
            vec![Branch::Hit, Branch::CriticalHit, Branch::FailedSaveBy(9), Branch::PassedSave]
        } else {
            vec![Branch::Miss, Branch::FailedSave]
        };
        let nodes = find_nodes_by_contexts(&tree, &contexts, false, true);

        let once = group_nodes(&nodes);
        let regrouped: Vec<&EffectNode> = once.iter().flatten().copied().collect();
        let twice = group_nodes(&regrouped);

        let ids = |groups: &[Vec<&EffectNode>]| -> Vec<Vec<String>> {
            groups.iter().map(|g| g.iter().map(|n| n.id().to_string()).collect()).collect()
        };
        prop_assert_eq!(ids(&once), ids(&twice));
        prop_assert_eq!(regrouped.len(), nodes.len());
    }
}

#[test]
fn test_scenario_d_from_json() {
    let tree: Vec<EffectNode> = serde_json::from_value(json!([{
        "type": "savingThrow",
        "id": "save",
        "savingThrowType": "dexterity",
        "saveDC": 15,
        "sharedRolls": [
            { "type": "damage", "id": "r1", "damageType": "fire", "formula": "8d6",
              "parentNode": "save", "parentContext": "sharedRolls" },
            { "type": "damage", "id": "r2", "damageType": "lightning", "formula": "2d6",
              "parentNode": "save", "parentContext": "sharedRolls" }
        ],
        "on": {
            "failedSave": [
                { "type": "damageOutcome", "id": "o1", "outcome": "fullDamage",
                  "parentNode": "save", "parentContext": "failedSave" }
            ]
        }
    }]))
    .unwrap();

    let flat = flatten(&tree);
    let contexts: Vec<_> = flat
        .iter()
        .map(|n| (n.id().as_str(), n.parent_context()))
        .collect();
    assert_eq!(
        contexts,
        vec![
            ("save", None),
            ("r1", Some(Branch::SharedRolls)),
            ("r2", Some(Branch::SharedRolls)),
            ("o1", Some(Branch::FailedSave)),
        ]
    );

    let rebuilt = reconstruct(flat).unwrap();
    assert_eq!(rebuilt, tree);
    assert_eq!(rebuilt[0].shared_rolls().len(), 2);
    assert_eq!(
        rebuilt[0].consequence().unwrap().branch(Branch::FailedSave).unwrap().len(),
        1
    );
}

#[test]
fn test_margin_buckets_from_json() {
    let tree: Vec<EffectNode> = serde_json::from_value(json!([{
        "type": "savingThrow",
        "id": "save",
        "savingThrowType": "constitution",
        "on": {
            "failedSaveBy": {
                "5": [{ "type": "condition", "id": "c5", "condition": "stunned",
                        "parentNode": "save", "parentContext": "failedSaveBy.5" }],
                "10": [{ "type": "condition", "id": "c10", "condition": "unconscious",
                         "parentNode": "save", "parentContext": "failedSaveBy.10" }]
            }
        }
    }]))
    .unwrap();

    let ids: Vec<_> = flatten(&tree).iter().map(|n| n.id().to_string()).collect();
    assert_eq!(ids, vec!["save", "c5", "c10"]);

    let by_seven = find_nodes_by_contexts(&tree, &[Branch::FailedSaveBy(7)], true, false);
    assert_eq!(by_seven.len(), 1);
    assert_eq!(by_seven[0].id().as_str(), "c5");

    let value = serde_json::to_value(&tree).unwrap();
    assert!(value[0]["on"]["failedSaveBy"]["10"].is_array());
}

#[test]
fn test_dangling_parent_is_an_error() {
    let mut orphan: EffectNode = ConditionNode::new("c1", "blinded").into();
    orphan.set_link(Some((Branch::Hit, NodeId::from("gone"))));

    let err = reconstruct(vec![orphan]).unwrap_err();
    assert_eq!(
        err,
        TreeError::DanglingParent {
            node: NodeId::from("c1"),
            parent: NodeId::from("gone"),
        }
    );
}
