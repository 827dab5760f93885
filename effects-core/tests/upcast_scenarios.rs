//! Upcast validation and scaling through the public API, using item JSON as
//! a host would store it.

use effects_core::dice::DiceExpression;
use effects_core::{
    apply_upcast_deltas, flatten, validate_upcast, CasterState, EffectNode, ItemDocument,
    UpcastContext, UpcastError, UpcastRequest,
};
use proptest::prelude::*;
use serde_json::json;

fn item(value: serde_json::Value) -> ItemDocument {
    serde_json::from_value(value).unwrap()
}

fn searing_bolt() -> ItemDocument {
    item(json!({
        "name": "Searing Bolt",
        "type": "spell",
        "system": {
            "tier": 2,
            "scaling": {
                "mode": "upcast",
                "deltas": [{ "operation": "addFlatDamage", "value": 3 }]
            },
            "activation": {
                "effects": [{
                    "type": "damage",
                    "id": "d1",
                    "damageType": "fire",
                    "formula": "2d8",
                    "on": {
                        "hit": [{ "type": "damageOutcome", "id": "o1", "outcome": "fullDamage",
                                  "parentNode": "d1", "parentContext": "hit" }]
                    }
                }],
                "targets": { "count": 1, "distance": 8 }
            }
        }
    }))
}

fn damage_formula(effects: &[EffectNode]) -> String {
    flatten(effects)
        .into_iter()
        .find_map(|node| match node {
            EffectNode::Damage(damage) => Some(damage.formula),
            _ => None,
        })
        .unwrap()
}

#[test]
fn test_scenario_a_flat_damage_scales_by_steps() {
    let spell = searing_bolt();
    let ctx = UpcastContext::for_item(&spell, CasterState::new(10, 4), UpcastRequest::new(4));

    let validation = validate_upcast(&ctx);
    assert!(validation.valid);
    assert_eq!(validation.upcast_steps, 2);

    let outcome = apply_upcast_deltas(&ctx).unwrap();
    assert_eq!(outcome.result.upcast_steps, 2);
    assert_eq!(outcome.result.mana_spent, 4);
    assert_eq!(damage_formula(&outcome.activation.effects), "2d8+6");

    // The item itself is untouched.
    assert_eq!(damage_formula(&spell.system.activation.effects), "2d8");
    assert_eq!(outcome.activation.targets, spell.system.activation.targets);
}

#[test]
fn test_scenario_b_cantrips_cannot_be_upcast() {
    let cantrip = item(json!({
        "name": "Spark",
        "type": "spell",
        "system": {
            "tier": 0,
            "scaling": {
                "mode": "upcast",
                "deltas": [{ "operation": "addDice", "dice": { "count": 1, "faces": 6 } }]
            },
            "activation": { "effects": [] }
        }
    }));
    let ctx = UpcastContext::for_item(&cantrip, CasterState::new(10, 9), UpcastRequest::new(3));

    let validation = serde_json::to_value(validate_upcast(&ctx)).unwrap();
    assert_eq!(validation["valid"], false);
    assert_eq!(validation["error"], "Cantrips cannot be upcast");
}

#[test]
fn test_scenario_e_choice_index_out_of_range() {
    let spell = item(json!({
        "name": "Chromatic Orb",
        "type": "spell",
        "system": {
            "tier": 1,
            "scaling": {
                "mode": "upcastChoice",
                "choices": [
                    { "label": "Bigger orb", "deltas": [{ "operation": "addDice", "dice": { "count": 1, "faces": 8 } }] },
                    { "label": "More orbs", "deltas": [{ "operation": "addTargets", "value": 1 }] }
                ]
            },
            "activation": {
                "effects": [{ "type": "damage", "id": "d1", "damageType": "acid", "formula": "3d8" }]
            }
        }
    }));
    let caster = CasterState::new(5, 3);

    let ctx = UpcastContext::for_item(&spell, caster, UpcastRequest::new(2).with_choice(5));
    let err = apply_upcast_deltas(&ctx).unwrap_err();
    assert_eq!(err, UpcastError::InvalidChoiceIndex(5));
    assert_eq!(err.to_string(), "Invalid choice index: 5");

    let ctx = UpcastContext::for_item(&spell, caster, UpcastRequest::new(3).with_choice(0));
    let outcome = apply_upcast_deltas(&ctx).unwrap();
    assert_eq!(damage_formula(&outcome.activation.effects), "3d8+2d8");
    assert_eq!(outcome.result.choice_index, Some(0));
}

#[test]
fn test_unknown_operation_round_trips() {
    let spell = item(json!({
        "name": "Odd Spell",
        "type": "spell",
        "system": {
            "tier": 1,
            "scaling": { "mode": "upcast", "deltas": [{ "operation": "addSummons", "value": 1 }] }
        }
    }));
    let ctx = UpcastContext::for_item(&spell, CasterState::new(3, 3), UpcastRequest::new(3));

    let outcome = apply_upcast_deltas(&ctx).unwrap();
    assert!(outcome.result.applied_deltas.is_empty());
    assert_eq!(outcome.activation, spell.system.activation);

    let value = serde_json::to_value(&spell).unwrap();
    assert_eq!(
        value["system"]["scaling"]["deltas"][0]["operation"],
        "addSummons"
    );
}

proptest! {
    #[test]
    fn flat_damage_is_linear_in_steps(value in -5i32..=5, tier in 1u32..=5, extra in 0u32..=4) {
        let spell = item(json!({
            "name": "Bolt",
            "type": "spell",
            "system": {
                "tier": tier,
                "scaling": { "mode": "upcast", "deltas": [{ "operation": "addFlatDamage", "value": value }] },
                "activation": {
                    "effects": [{ "type": "damage", "id": "d1", "damageType": "force", "formula": "1d10" }]
                }
            }
        }));
        let mana = tier + extra;
        let ctx = UpcastContext::for_item(&spell, CasterState::new(mana, mana), UpcastRequest::new(mana));
        let outcome = apply_upcast_deltas(&ctx).unwrap();

        let expected_bonus = i64::from(value) * i64::from(extra);
        let formula = damage_formula(&outcome.activation.effects);
        let parsed = DiceExpression::parse(&formula).unwrap();
        prop_assert_eq!(parsed.modifier, expected_bonus);
        prop_assert_eq!(outcome.result.upcast_steps, extra);
        if expected_bonus == 0 {
            prop_assert_eq!(formula, "1d10");
        }
    }

    #[test]
    fn dice_count_is_monotonic_in_mana(count in 1u32..=3, extra in 0u32..=3) {
        let spell = item(json!({
            "name": "Frost Ray",
            "type": "spell",
            "system": {
                "tier": 1,
                "scaling": { "mode": "upcast", "deltas": [{ "operation": "addDice", "dice": { "count": count, "faces": 6 } }] },
                "activation": {
                    "effects": [{ "type": "damage", "id": "d1", "damageType": "cold", "formula": "1d6" }]
                }
            }
        }));
        let dice_at = |mana: u32| -> u32 {
            let ctx = UpcastContext::for_item(&spell, CasterState::new(9, 9), UpcastRequest::new(mana));
            let outcome = apply_upcast_deltas(&ctx).unwrap();
            DiceExpression::parse(&damage_formula(&outcome.activation.effects))
                .unwrap()
                .components
                .iter()
                .map(|c| c.count)
                .sum()
        };

        let lower = dice_at(1 + extra);
        let higher = dice_at(2 + extra);
        prop_assert_eq!(lower, 1 + count * extra);
        prop_assert_eq!(higher, lower + count);
    }
}
