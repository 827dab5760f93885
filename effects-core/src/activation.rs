//! Activation data and the host documents it is read from.
//!
//! The host (a virtual tabletop document store) owns items and actors. This
//! crate only reads them: an item's `system.activation` carries the effect
//! tree plus targeting, area and duration blocks that upcasting can scale.
//! Fields this crate does not model are kept verbatim in `extra`.

use crate::node::EffectNode;
use crate::upcast::SpellScaling;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Everything an ability does when activated.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivationData {
    #[serde(default)]
    pub effects: Vec<EffectNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub targets: Option<Targets>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<AreaTemplate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<ActivationDuration>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ActivationData {
    pub fn new(effects: Vec<EffectNode>) -> Self {
        Self {
            effects,
            ..Self::default()
        }
    }

    pub fn with_targets(mut self, targets: Targets) -> Self {
        self.targets = Some(targets);
        self
    }

    pub fn with_template(mut self, template: AreaTemplate) -> Self {
        self.template = Some(template);
        self
    }

    pub fn with_duration(mut self, duration: ActivationDuration) -> Self {
        self.duration = Some(duration);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Targets {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    /// Reach or range, in spaces.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<u32>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AreaTemplate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radius: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivationDuration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Kind of item document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ItemType {
    Spell,
    Feature,
    MonsterFeature,
    Object,
    Ancestry,
    Background,
    Boon,
    Class,
    Subclass,
    #[serde(other)]
    Other,
}

impl ItemType {
    /// Character-origin documents that describe a character rather than an action.
    pub fn origin_types() -> Vec<ItemType> {
        vec![
            ItemType::Ancestry,
            ItemType::Background,
            ItemType::Boon,
            ItemType::Class,
            ItemType::Subclass,
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemSystem {
    /// Spell tier; 0 for cantrips and non-spell items.
    #[serde(default)]
    pub tier: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scaling: Option<SpellScaling>,
    #[serde(default)]
    pub activation: ActivationData,
}

/// Read-only view of an item document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemDocument {
    pub name: String,
    #[serde(rename = "type")]
    pub item_type: ItemType,
    #[serde(default)]
    pub system: ItemSystem,
}

impl ItemDocument {
    pub fn new(name: impl Into<String>, item_type: ItemType, activation: ActivationData) -> Self {
        Self {
            name: name.into(),
            item_type,
            system: ItemSystem {
                activation,
                ..ItemSystem::default()
            },
        }
    }

    /// A spell of `tier` with optional scaling.
    pub fn spell(
        name: impl Into<String>,
        tier: u32,
        scaling: Option<SpellScaling>,
        activation: ActivationData,
    ) -> Self {
        Self {
            name: name.into(),
            item_type: ItemType::Spell,
            system: ItemSystem {
                tier,
                scaling,
                activation,
            },
        }
    }
}

/// Read-only accessors the engine needs from the activating actor.
pub trait ActorDocument: Send + Sync {
    /// Data used to resolve `@` references in formulas.
    fn roll_data(&self) -> Value;

    fn current_mana(&self) -> u32;

    fn highest_unlocked_spell_tier(&self) -> u32;

    /// Formula for this actor's saving throw of `save` (e.g. `"dexterity"`).
    fn saving_throw_formula(&self, save: &str, roll_mode: i32) -> Option<String>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unknown_activation_fields_survive() {
        let value = json!({
            "effects": [],
            "targets": { "count": 2, "restrictions": "enemies" },
            "cost": { "quantity": 1, "type": "action" },
            "acquireTargetsFromTemplate": true
        });

        let activation: ActivationData = serde_json::from_value(value.clone()).unwrap();
        assert_eq!(activation.targets.as_ref().unwrap().count, Some(2));
        assert_eq!(activation.extra["acquireTargetsFromTemplate"], true);
        assert_eq!(serde_json::to_value(&activation).unwrap(), value);
    }

    #[test]
    fn test_item_document_json() {
        let value = json!({
            "name": "Heroic Origin",
            "type": "background",
            "system": {}
        });
        let item: ItemDocument = serde_json::from_value(value).unwrap();
        assert_eq!(item.item_type, ItemType::Background);
        assert!(ItemType::origin_types().contains(&item.item_type));
        assert!(item.system.activation.effects.is_empty());

        let other: ItemDocument =
            serde_json::from_value(json!({ "name": "Odd", "type": "relic" })).unwrap();
        assert_eq!(other.item_type, ItemType::Other);
    }
}
