//! Upcasting: spending extra mana to empower a spell.
//!
//! Validation is pure and reports rule violations as data so a dialog can show
//! them inline. Application works on a private clone of the activation data
//! and scales every numeric delta by the number of upcast steps
//! (`mana spent - spell tier`).

use crate::activation::{ActivationData, ActorDocument, ItemDocument, Targets};
use crate::node::{ConditionNode, EffectNode, NodeId};
use crate::tree::{self, TreeError};
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;
use tracing::{debug, warn};

/// How a spell scales when upcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScalingMode {
    #[default]
    None,
    /// One fixed delta set.
    Upcast,
    /// The caster picks one of several named delta sets.
    UpcastChoice,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpellScaling {
    #[serde(default)]
    pub mode: ScalingMode,
    #[serde(default)]
    pub deltas: Vec<ScalingDelta>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<ScalingChoice>,
}

impl SpellScaling {
    pub fn upcast(deltas: Vec<ScalingDelta>) -> Self {
        Self {
            mode: ScalingMode::Upcast,
            deltas,
            choices: Vec::new(),
        }
    }

    pub fn choice(choices: Vec<ScalingChoice>) -> Self {
        Self {
            mode: ScalingMode::UpcastChoice,
            deltas: Vec::new(),
            choices,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScalingChoice {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub deltas: Vec<ScalingDelta>,
}

impl ScalingChoice {
    pub fn new(label: impl Into<String>, deltas: Vec<ScalingDelta>) -> Self {
        Self {
            label: label.into(),
            deltas,
        }
    }
}

/// Delta kinds. Names not known to this version are kept as `Unknown`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DeltaOperation {
    AddFlatDamage,
    AddDice,
    AddReach,
    AddRange,
    AddTargets,
    AddAreaSize,
    AddDc,
    AddCondition,
    AddDuration,
    AddArmor,
    Unknown(String),
}

impl DeltaOperation {
    /// Whether the operation scales its `value` field.
    pub fn takes_value(&self) -> bool {
        !matches!(
            self,
            DeltaOperation::AddDice | DeltaOperation::AddCondition | DeltaOperation::Unknown(_)
        )
    }

    pub fn name(&self) -> &str {
        match self {
            DeltaOperation::AddFlatDamage => "addFlatDamage",
            DeltaOperation::AddDice => "addDice",
            DeltaOperation::AddReach => "addReach",
            DeltaOperation::AddRange => "addRange",
            DeltaOperation::AddTargets => "addTargets",
            DeltaOperation::AddAreaSize => "addAreaSize",
            DeltaOperation::AddDc => "addDC",
            DeltaOperation::AddCondition => "addCondition",
            DeltaOperation::AddDuration => "addDuration",
            DeltaOperation::AddArmor => "addArmor",
            DeltaOperation::Unknown(name) => name,
        }
    }
}

impl From<String> for DeltaOperation {
    fn from(name: String) -> Self {
        match name.as_str() {
            "addFlatDamage" => DeltaOperation::AddFlatDamage,
            "addDice" => DeltaOperation::AddDice,
            "addReach" => DeltaOperation::AddReach,
            "addRange" => DeltaOperation::AddRange,
            "addTargets" => DeltaOperation::AddTargets,
            "addAreaSize" => DeltaOperation::AddAreaSize,
            "addDC" => DeltaOperation::AddDc,
            "addCondition" => DeltaOperation::AddCondition,
            "addDuration" => DeltaOperation::AddDuration,
            "addArmor" => DeltaOperation::AddArmor,
            _ => DeltaOperation::Unknown(name),
        }
    }
}

impl From<DeltaOperation> for String {
    fn from(operation: DeltaOperation) -> Self {
        operation.name().to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceDelta {
    pub count: u32,
    pub faces: u32,
}

/// One scaling rule, applied once per upcast step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScalingDelta {
    pub operation: DeltaOperation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dice: Option<DiceDelta>,
    /// Node to modify; the first node of a fitting type otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_effect_id: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

impl ScalingDelta {
    pub fn new(operation: DeltaOperation) -> Self {
        Self {
            operation,
            value: None,
            dice: None,
            target_effect_id: None,
            condition: None,
        }
    }

    pub fn flat_damage(value: i32) -> Self {
        Self::new(DeltaOperation::AddFlatDamage).with_value(value)
    }

    pub fn dice(count: u32, faces: u32) -> Self {
        Self {
            dice: Some(DiceDelta { count, faces }),
            ..Self::new(DeltaOperation::AddDice)
        }
    }

    pub fn condition(condition: impl Into<String>) -> Self {
        Self {
            condition: Some(condition.into()),
            ..Self::new(DeltaOperation::AddCondition)
        }
    }

    pub fn with_value(mut self, value: i32) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_target(mut self, id: impl Into<NodeId>) -> Self {
        self.target_effect_id = Some(id.into());
        self
    }
}

/// Mana state of the caster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CasterState {
    pub current_mana: u32,
    pub highest_unlocked_spell_tier: u32,
}

impl CasterState {
    pub fn new(current_mana: u32, highest_unlocked_spell_tier: u32) -> Self {
        Self {
            current_mana,
            highest_unlocked_spell_tier,
        }
    }

    pub fn of(actor: &dyn ActorDocument) -> Self {
        Self::new(actor.current_mana(), actor.highest_unlocked_spell_tier())
    }
}

/// What the caster asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpcastRequest {
    pub mana_to_spend: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choice_index: Option<usize>,
}

impl UpcastRequest {
    pub fn new(mana_to_spend: u32) -> Self {
        Self {
            mana_to_spend,
            choice_index: None,
        }
    }

    pub fn with_choice(mut self, index: usize) -> Self {
        self.choice_index = Some(index);
        self
    }
}

/// Inputs to validation and delta application.
#[derive(Debug, Clone, Copy)]
pub struct UpcastContext<'a> {
    pub tier: u32,
    pub scaling: Option<&'a SpellScaling>,
    pub caster: CasterState,
    pub activation: &'a ActivationData,
    pub request: UpcastRequest,
}

impl<'a> UpcastContext<'a> {
    pub fn for_item(item: &'a ItemDocument, caster: CasterState, request: UpcastRequest) -> Self {
        Self {
            tier: item.system.tier,
            scaling: item.system.scaling.as_ref(),
            caster,
            activation: &item.system.activation,
            request,
        }
    }
}

/// A broken upcast rule.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpcastViolation {
    #[error("Cantrips cannot be upcast")]
    Cantrip,

    #[error("This spell cannot be upcast")]
    NotScalable,

    #[error("Insufficient mana: spending {needed} but only {available} available")]
    InsufficientMana { needed: u32, available: u32 },

    #[error("Must spend at least {tier} mana")]
    BelowBaseCost { tier: u32 },

    #[error("Cannot spend more than {highest} mana (highest unlocked spell tier)")]
    AboveUnlockedTier { highest: u32 },
}

/// Outcome of [`validate_upcast`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub valid: bool,
    #[serde(serialize_with = "violation_message", skip_serializing_if = "Option::is_none")]
    pub error: Option<UpcastViolation>,
    pub upcast_steps: u32,
}

fn violation_message<S: Serializer>(
    violation: &Option<UpcastViolation>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match violation {
        Some(violation) => serializer.serialize_some(&violation.to_string()),
        None => serializer.serialize_none(),
    }
}

/// Errors from [`apply_upcast_deltas`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpcastError {
    #[error(transparent)]
    Invalid(#[from] UpcastViolation),

    #[error("Invalid choice index: {0}")]
    InvalidChoiceIndex(usize),

    #[error("A choice is required: this spell offers {available} upcast options")]
    ChoiceRequired { available: usize },

    #[error("Malformed effect tree: {0}")]
    Tree(#[from] TreeError),
}

/// A delta that changed the activation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedDelta {
    pub operation: DeltaOperation,
    /// Scaled amount; dice count for `addDice`, 1 for `addCondition`.
    pub amount: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_effect_id: Option<NodeId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpcastResult {
    pub is_upcast: bool,
    pub mana_spent: u32,
    pub upcast_steps: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choice_index: Option<usize>,
    pub applied_deltas: Vec<AppliedDelta>,
}

/// The scaled copy of the activation plus a summary of what changed.
#[derive(Debug, Clone, PartialEq)]
pub struct UpcastOutcome {
    pub activation: ActivationData,
    pub result: UpcastResult,
}

/// Check the upcast rules; the first failing rule is reported.
pub fn validate_upcast(ctx: &UpcastContext<'_>) -> ValidationResult {
    match check_rules(ctx) {
        Ok(upcast_steps) => ValidationResult {
            valid: true,
            error: None,
            upcast_steps,
        },
        Err(violation) => ValidationResult {
            valid: false,
            error: Some(violation),
            upcast_steps: 0,
        },
    }
}

fn check_rules(ctx: &UpcastContext<'_>) -> Result<u32, UpcastViolation> {
    let mana = ctx.request.mana_to_spend;

    if ctx.tier == 0 {
        return Err(UpcastViolation::Cantrip);
    }
    if ctx.scaling.map_or(true, |s| s.mode == ScalingMode::None) {
        return Err(UpcastViolation::NotScalable);
    }
    if mana > ctx.caster.current_mana {
        return Err(UpcastViolation::InsufficientMana {
            needed: mana,
            available: ctx.caster.current_mana,
        });
    }
    if mana < ctx.tier {
        return Err(UpcastViolation::BelowBaseCost { tier: ctx.tier });
    }
    if mana > ctx.caster.highest_unlocked_spell_tier {
        return Err(UpcastViolation::AboveUnlockedTier {
            highest: ctx.caster.highest_unlocked_spell_tier,
        });
    }
    Ok(mana - ctx.tier)
}

/// Validate, clone the activation, and apply the selected deltas to the clone.
pub fn apply_upcast_deltas(ctx: &UpcastContext<'_>) -> Result<UpcastOutcome, UpcastError> {
    let steps = check_rules(ctx)?;
    let scaling = ctx.scaling.ok_or(UpcastViolation::NotScalable)?;
    let deltas = select_deltas(scaling, ctx.request.choice_index)?;

    let mut activation = ctx.activation.clone();
    let mut arena = tree::flatten(&activation.effects);
    let applied: Vec<AppliedDelta> = deltas
        .iter()
        .filter_map(|delta| apply_delta(&mut activation, &mut arena, delta, steps))
        .collect();
    activation.effects = tree::reconstruct(arena)?;

    debug!(
        mana = ctx.request.mana_to_spend,
        steps,
        applied = applied.len(),
        "Applied upcast deltas"
    );

    Ok(UpcastOutcome {
        activation,
        result: UpcastResult {
            is_upcast: steps > 0,
            mana_spent: ctx.request.mana_to_spend,
            upcast_steps: steps,
            choice_index: match scaling.mode {
                ScalingMode::UpcastChoice => ctx.request.choice_index,
                _ => None,
            },
            applied_deltas: applied,
        },
    })
}

fn select_deltas(
    scaling: &SpellScaling,
    choice_index: Option<usize>,
) -> Result<&[ScalingDelta], UpcastError> {
    match scaling.mode {
        ScalingMode::UpcastChoice => {
            let index = choice_index.ok_or(UpcastError::ChoiceRequired {
                available: scaling.choices.len(),
            })?;
            scaling
                .choices
                .get(index)
                .map(|choice| choice.deltas.as_slice())
                .ok_or(UpcastError::InvalidChoiceIndex(index))
        }
        ScalingMode::Upcast | ScalingMode::None => Ok(scaling.deltas.as_slice()),
    }
}

fn apply_delta(
    activation: &mut ActivationData,
    arena: &mut Vec<EffectNode>,
    delta: &ScalingDelta,
    steps: u32,
) -> Option<AppliedDelta> {
    if delta.operation.takes_value() && delta.value.is_none() {
        warn!(operation = delta.operation.name(), "Upcast delta has no value; skipping");
        return None;
    }
    let amount = i64::from(delta.value.unwrap_or(0)) * i64::from(steps);
    let applied = |amount: i64, target: Option<NodeId>| {
        Some(AppliedDelta {
            operation: delta.operation.clone(),
            amount,
            target_effect_id: target,
        })
    };

    match &delta.operation {
        DeltaOperation::AddFlatDamage => {
            if amount == 0 {
                return None;
            }
            let index = target_index(arena, delta, |n| matches!(n, EffectNode::Damage(_)))?;
            let EffectNode::Damage(damage) = &mut arena[index] else {
                return None;
            };
            damage.formula = append_flat(&damage.formula, amount);
            applied(amount, Some(damage.id.clone()))
        }
        DeltaOperation::AddDice => {
            let Some(dice) = delta.dice else {
                warn!(operation = delta.operation.name(), "Upcast delta has no dice; skipping");
                return None;
            };
            if dice.faces == 0 {
                warn!(operation = delta.operation.name(), "Upcast delta adds zero-sided dice; skipping");
                return None;
            }
            let count = i64::from(dice.count) * i64::from(steps);
            if count == 0 {
                return None;
            }
            let index = target_index(arena, delta, |n| {
                matches!(n, EffectNode::Damage(_) | EffectNode::Healing(_))
            })?;
            let (id, formula) = match &mut arena[index] {
                EffectNode::Damage(n) => (&n.id, &mut n.formula),
                EffectNode::Healing(n) => (&n.id, &mut n.formula),
                _ => return None,
            };
            formula.push_str(&format!("+{}d{}", count, dice.faces));
            applied(count, Some(id.clone()))
        }
        DeltaOperation::AddReach | DeltaOperation::AddRange => {
            if amount == 0 {
                return None;
            }
            let targets = activation.targets.get_or_insert_with(Targets::default);
            targets.distance = Some(offset(targets.distance.unwrap_or(0), amount));
            applied(amount, None)
        }
        DeltaOperation::AddTargets => {
            if amount == 0 {
                return None;
            }
            let targets = activation.targets.get_or_insert_with(Targets::default);
            targets.count = Some(offset(targets.count.unwrap_or(1), amount));
            applied(amount, None)
        }
        DeltaOperation::AddAreaSize => {
            if amount == 0 {
                return None;
            }
            let Some(template) = activation.template.as_mut() else {
                warn!("addAreaSize delta on an activation without a template; skipping");
                return None;
            };
            if template.radius.is_none() && template.length.is_none() {
                warn!("addAreaSize delta on a template without radius or length; skipping");
                return None;
            }
            if let Some(radius) = template.radius.as_mut() {
                *radius = offset(*radius, amount);
            }
            if let Some(length) = template.length.as_mut() {
                *length = offset(*length, amount);
            }
            applied(amount, None)
        }
        DeltaOperation::AddDc => {
            if amount == 0 {
                return None;
            }
            let index = target_index(arena, delta, |n| matches!(n, EffectNode::SavingThrow(_)))?;
            let EffectNode::SavingThrow(save) = &mut arena[index] else {
                return None;
            };
            let Some(dc) = save.save_dc.as_mut() else {
                warn!(node = %save.id, "addDC delta on a saving throw without a fixed DC; skipping");
                return None;
            };
            *dc = (i64::from(*dc) + amount).clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32;
            applied(amount, Some(save.id.clone()))
        }
        DeltaOperation::AddCondition => {
            // Binary: granted by any upcast, never multiplied.
            if steps == 0 {
                return None;
            }
            let Some(condition) = delta.condition.as_deref() else {
                warn!("addCondition delta without a condition; skipping");
                return None;
            };
            let node = ConditionNode::new(NodeId::generate(), condition);
            let id = node.id.clone();
            arena.push(node.into());
            applied(1, Some(id))
        }
        DeltaOperation::AddDuration => {
            if amount == 0 {
                return None;
            }
            let Some(duration) = activation.duration.as_mut() else {
                warn!("addDuration delta on an activation without a duration; skipping");
                return None;
            };
            duration.quantity = Some(offset(duration.quantity.unwrap_or(0), amount));
            applied(amount, None)
        }
        DeltaOperation::AddArmor => {
            // Armor lives on the actor; report it so the caller can apply it.
            if amount == 0 {
                return None;
            }
            applied(amount, None)
        }
        DeltaOperation::Unknown(name) => {
            warn!(operation = %name, "Unknown upcast delta operation; skipping");
            None
        }
    }
}

/// Locate the node a delta modifies in flat (depth-first) order.
fn target_index(
    arena: &[EffectNode],
    delta: &ScalingDelta,
    accepts: impl Fn(&EffectNode) -> bool,
) -> Option<usize> {
    let operation = delta.operation.name();
    match &delta.target_effect_id {
        Some(id) => match arena.iter().position(|node| node.id() == id) {
            Some(index) if accepts(&arena[index]) => Some(index),
            Some(index) => {
                warn!(
                    operation,
                    target = %id,
                    node_type = arena[index].type_name(),
                    "Upcast delta targets a node of the wrong type; skipping"
                );
                None
            }
            None => {
                warn!(operation, target = %id, "Upcast delta target not found; skipping");
                None
            }
        },
        None => {
            let index = arena.iter().position(accepts);
            if index.is_none() {
                warn!(operation, "No effect node for upcast delta; skipping");
            }
            index
        }
    }
}

fn append_flat(formula: &str, amount: i64) -> String {
    if amount < 0 {
        format!("{}-{}", formula, amount.unsigned_abs())
    } else {
        format!("{}+{}", formula, amount)
    }
}

fn offset(base: u32, amount: i64) -> u32 {
    (i64::from(base) + amount).clamp(0, i64::from(u32::MAX)) as u32
}
