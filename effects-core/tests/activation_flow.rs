//! End-to-end activation: item JSON in, rolled tree and chat-card groups out.

use effects_core::{
    damage_source_of, get_relevant_nodes, ActivationConfig, ActivationResolver, Branch,
    DialogOverrides, EffectNode, ItemDocument, ItemType, NodeId, RelevanceOptions, ScriptedDice,
    StandardDice, TestActor, UpcastRequest,
};
use serde_json::json;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn thunder_strike() -> ItemDocument {
    serde_json::from_value(json!({
        "name": "Thunder Strike",
        "type": "spell",
        "system": {
            "tier": 1,
            "scaling": {
                "mode": "upcast",
                "deltas": [
                    { "operation": "addDice", "dice": { "count": 1, "faces": 8 }, "targetEffectId": "d1" },
                    { "operation": "addCondition", "condition": "deafened" }
                ]
            },
            "activation": {
                "effects": [
                    { "type": "note", "id": "n1", "noteType": "flavor", "text": "The air splits." },
                    {
                        "type": "damage",
                        "id": "d1",
                        "damageType": "thunder",
                        "formula": "2d8+@abilities.int.mod",
                        "canCrit": true,
                        "canMiss": true,
                        "on": {
                            "hit": [
                                { "type": "damageOutcome", "id": "o1", "outcome": "fullDamage",
                                  "parentNode": "d1", "parentContext": "hit" }
                            ],
                            "criticalHit": [
                                { "type": "condition", "id": "c1", "condition": "prone",
                                  "parentNode": "d1", "parentContext": "criticalHit" }
                            ]
                        }
                    },
                    {
                        "type": "savingThrow",
                        "id": "s1",
                        "savingThrowType": "strength",
                        "saveDC": 13,
                        "on": {
                            "failedSave": [
                                { "type": "damage", "id": "d2", "damageType": "thunder", "formula": "1d4",
                                  "parentNode": "s1", "parentContext": "failedSave" }
                            ]
                        }
                    }
                ],
                "targets": { "count": 1, "distance": 12 }
            }
        }
    }))
    .unwrap()
}

fn wizard() -> TestActor {
    TestActor::new()
        .with_mana(5, 3)
        .with_save("strength", -1)
        .with_roll_data(json!({ "abilities": { "int": { "mod": 4 } } }))
}

#[tokio::test]
async fn test_resolution_with_scripted_dice() {
    init_tracing();
    let resolver = ActivationResolver::new(ScriptedDice::new([13, 7, 2]));
    let overrides = DialogOverrides::new().with_primary_die_value(8);

    let outcome = resolver
        .resolve(&thunder_strike(), &wizard(), &overrides)
        .await
        .unwrap();

    let requests = resolver.dice().requests().await;
    let formulas: Vec<&str> = requests.iter().map(|r| r.formula.as_str()).collect();
    assert_eq!(formulas, vec!["2d8+@abilities.int.mod", "1d20-1", "1d4"]);
    assert_eq!(requests[0].options.primary_die_value, Some(8));
    assert!(requests[0].options.can_miss);
    assert_eq!(requests[0].roll_data["abilities"]["int"]["mod"], 4);
    assert_eq!(requests[2].options.primary_die_value, None);

    // Chat card: what happens on a hit, with the roll that produced it.
    let groups = get_relevant_nodes(
        &outcome.activation.effects,
        &[Branch::Hit],
        RelevanceOptions::new().with_base_damage_nodes(true),
    );
    let ids: Vec<Vec<&str>> = groups
        .iter()
        .map(|g| g.iter().map(|n| n.id().as_str()).collect())
        .collect();
    assert_eq!(ids, vec![vec!["n1"], vec!["d1", "o1"], vec!["s1"]]);
    assert_eq!(groups[1][0].roll().unwrap()["total"], 13);

    let source = damage_source_of(&outcome.activation.effects, &NodeId::from("o1")).unwrap();
    assert_eq!(source.roll.as_ref().unwrap()["total"], 13);
}

#[tokio::test]
async fn test_resolution_with_standard_dice() {
    init_tracing();
    let resolver = ActivationResolver::new(StandardDice::seeded(2024));
    let overrides = DialogOverrides::new().with_roll_mode(1);

    let outcome = resolver
        .resolve(&thunder_strike(), &wizard(), &overrides)
        .await
        .unwrap();

    assert_eq!(outcome.rolls.len(), 3);
    assert_eq!(outcome.rolls[0].formula, "2d8+4");
    let primary = &outcome.rolls[0].data["componentResults"][0];
    assert_eq!(primary["rolls"].as_array().unwrap().len(), 3);
    assert_eq!(primary["kept"].as_array().unwrap().len(), 2);

    let save_total = outcome.rolls[1].total;
    assert!((0..=19).contains(&save_total));

    // Results are embedded in the returned tree, keyed by node.
    let EffectNode::SavingThrow(save) = &outcome.activation.effects[2] else {
        panic!("expected saving throw");
    };
    assert_eq!(save.roll.as_ref().unwrap()["total"], save_total);
}

#[tokio::test]
async fn test_upcast_then_resolve() {
    init_tracing();
    let resolver = ActivationResolver::new(ScriptedDice::new([20, 10, 3]));

    let outcome = resolver
        .resolve_upcast(
            &thunder_strike(),
            &wizard(),
            &DialogOverrides::default(),
            UpcastRequest::new(3),
        )
        .await
        .unwrap();

    let upcast = outcome.upcast.as_ref().unwrap();
    assert!(upcast.is_upcast);
    assert_eq!(upcast.upcast_steps, 2);
    assert_eq!(upcast.applied_deltas.len(), 2);
    assert_eq!(outcome.rolls[0].formula, "2d8+@abilities.int.mod+2d8");

    // The granted condition is a new root and shows up as a base node.
    let EffectNode::Condition(granted) = outcome.activation.effects.last().unwrap() else {
        panic!("expected the granted condition");
    };
    assert_eq!(granted.condition, "deafened");
    let base = get_relevant_nodes(&outcome.activation.effects, &[], RelevanceOptions::new());
    assert!(base
        .iter()
        .flatten()
        .any(|n| n.id() == &granted.id));
}

#[tokio::test]
async fn test_custom_non_rollable_types() {
    let resolver = ActivationResolver::new(ScriptedDice::new([]))
        .with_config(ActivationConfig::new().with_non_rollable_types(vec![ItemType::Spell]));

    let outcome = resolver
        .resolve(&thunder_strike(), &wizard(), &DialogOverrides::default())
        .await
        .unwrap();
    assert!(outcome.rolls.is_empty());
    assert_eq!(resolver.dice().remaining().await, 0);
}

#[test]
fn test_config_from_json() {
    let config: ActivationConfig = serde_json::from_value(json!({
        "nonRollableTypes": ["class", "subclass"]
    }))
    .unwrap();
    assert_eq!(config.non_rollable_types, vec![ItemType::Class, ItemType::Subclass]);
    assert!(config.honor_dialog_overrides);

    let overrides: DialogOverrides =
        serde_json::from_value(json!({ "rollMode": -1 })).unwrap();
    assert_eq!(overrides.roll_mode, Some(-1));
    assert_eq!(overrides.primary_die_value, None);
}
