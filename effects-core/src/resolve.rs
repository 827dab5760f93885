//! Activation resolution: rolling every rollable node of an ability.
//!
//! The resolver clones the item's activation, walks the flattened tree in
//! order, evaluates one roll per rollable node through a [`DiceEngine`],
//! stores each result on its node and rebuilds the tree.

use crate::activation::{ActivationData, ActorDocument, ItemDocument, ItemType};
use crate::dice::{DiceEngine, EvaluatedRoll, RollError, RollKind, RollOptions, RollRequest};
use crate::node::{EffectNode, NodeId};
use crate::tree::{self, TreeError};
use crate::upcast::{
    apply_upcast_deltas, CasterState, UpcastContext, UpcastError, UpcastOutcome, UpcastRequest,
    UpcastResult,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Error type for activation resolution.
#[derive(Debug, Error)]
pub enum ActivationError {
    #[error("Malformed effect tree: {0}")]
    Tree(#[from] TreeError),

    #[error("Upcast failed: {0}")]
    Upcast(#[from] UpcastError),

    #[error("Roll failed: {0}")]
    Roll(#[from] RollError),

    #[error("Actor has no '{save}' saving throw (needed by node {node})")]
    MissingSaveFormula { node: NodeId, save: String },
}

/// Configuration for an [`ActivationResolver`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ActivationConfig {
    /// Item types that describe a character rather than an action; never rolled.
    pub non_rollable_types: Vec<ItemType>,

    /// Apply dialog roll mode and primary-die value to the first damage roll,
    /// and the dialog save roll mode to saving throws.
    pub honor_dialog_overrides: bool,
}

impl ActivationConfig {
    pub fn new() -> Self {
        Self {
            non_rollable_types: ItemType::origin_types(),
            honor_dialog_overrides: true,
        }
    }

    /// Set the item types that short-circuit without rolling.
    pub fn with_non_rollable_types(mut self, types: Vec<ItemType>) -> Self {
        self.non_rollable_types = types;
        self
    }

    pub fn with_dialog_overrides(mut self, honor: bool) -> Self {
        self.honor_dialog_overrides = honor;
        self
    }
}

impl Default for ActivationConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Choices made in the activation dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DialogOverrides {
    /// Roll mode for the first damage roll.
    pub roll_mode: Option<i32>,
    pub primary_die_value: Option<u32>,
    /// Roll mode handed to the actor when it builds saving throw formulas.
    /// Kept apart from `roll_mode`, which only ever touches the first damage roll.
    pub save_roll_mode: Option<i32>,
}

impl DialogOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_roll_mode(mut self, roll_mode: i32) -> Self {
        self.roll_mode = Some(roll_mode);
        self
    }

    pub fn with_primary_die_value(mut self, value: u32) -> Self {
        self.primary_die_value = Some(value);
        self
    }

    pub fn with_save_roll_mode(mut self, roll_mode: i32) -> Self {
        self.save_roll_mode = Some(roll_mode);
        self
    }
}

/// Rolls for the chat card plus the activation with results embedded.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivationOutcome {
    /// Evaluated rolls in flat tree order.
    pub rolls: Vec<EvaluatedRoll>,
    pub activation: ActivationData,
    pub upcast: Option<UpcastResult>,
}

/// Resolves item activations against a dice engine.
pub struct ActivationResolver<D: DiceEngine> {
    dice: D,
    config: ActivationConfig,
}

impl<D: DiceEngine> ActivationResolver<D> {
    pub fn new(dice: D) -> Self {
        Self {
            dice,
            config: ActivationConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ActivationConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &ActivationConfig {
        &self.config
    }

    pub fn dice(&self) -> &D {
        &self.dice
    }

    /// Roll every rollable node of `item`'s activation.
    ///
    /// The item itself is not modified; the returned activation is a copy.
    pub async fn resolve(
        &self,
        item: &ItemDocument,
        actor: &dyn ActorDocument,
        overrides: &DialogOverrides,
    ) -> Result<ActivationOutcome, ActivationError> {
        self.evaluate(item, item.system.activation.clone(), actor, overrides)
            .await
    }

    /// Apply upcast deltas for `request`, then roll the scaled activation.
    pub async fn resolve_upcast(
        &self,
        item: &ItemDocument,
        actor: &dyn ActorDocument,
        overrides: &DialogOverrides,
        request: UpcastRequest,
    ) -> Result<ActivationOutcome, ActivationError> {
        let ctx = UpcastContext::for_item(item, CasterState::of(actor), request);
        let UpcastOutcome { activation, result } = apply_upcast_deltas(&ctx)?;

        let mut outcome = self.evaluate(item, activation, actor, overrides).await?;
        outcome.upcast = Some(result);
        Ok(outcome)
    }

    async fn evaluate(
        &self,
        item: &ItemDocument,
        mut activation: ActivationData,
        actor: &dyn ActorDocument,
        overrides: &DialogOverrides,
    ) -> Result<ActivationOutcome, ActivationError> {
        if self.config.non_rollable_types.contains(&item.item_type) {
            debug!(item = %item.name, item_type = ?item.item_type, "Item type is not rollable");
            return Ok(ActivationOutcome {
                rolls: Vec::new(),
                activation,
                upcast: None,
            });
        }

        let roll_data = actor.roll_data();
        let mut flat = tree::flatten(&activation.effects);
        let mut rolls = Vec::new();
        let mut primary_damage_seen = false;
        let save_roll_mode = if self.config.honor_dialog_overrides {
            overrides.save_roll_mode.unwrap_or(0)
        } else {
            0
        };

        for node in flat.iter_mut() {
            let (kind, formula, options) = match &*node {
                EffectNode::SavingThrow(save) => {
                    let formula = actor
                        .saving_throw_formula(&save.saving_throw_type, save_roll_mode)
                        .ok_or_else(|| ActivationError::MissingSaveFormula {
                            node: save.id.clone(),
                            save: save.saving_throw_type.clone(),
                        })?;
                    (RollKind::SavingThrow, formula, RollOptions::default())
                }
                EffectNode::Damage(damage) => {
                    let options = if primary_damage_seen {
                        RollOptions::default()
                    } else {
                        primary_damage_seen = true;
                        self.primary_damage_options(
                            damage.roll_mode,
                            damage.can_crit,
                            damage.can_miss,
                            overrides,
                        )
                    };
                    (RollKind::Damage, damage.formula.clone(), options)
                }
                EffectNode::Healing(healing) => {
                    (RollKind::Healing, healing.formula.clone(), RollOptions::default())
                }
                EffectNode::DamageOutcome(_) | EffectNode::Condition(_) | EffectNode::Note(_) => {
                    continue
                }
            };

            let request = RollRequest::new(kind, formula, roll_data.clone()).with_options(options);
            let evaluated = self.dice.evaluate(&request).await?;
            debug!(
                node = %node.id(),
                kind = ?kind,
                formula = %evaluated.formula,
                total = evaluated.total,
                "Evaluated node roll"
            );
            node.set_roll(evaluated.data.clone());
            rolls.push(evaluated);
        }

        activation.effects = tree::reconstruct(flat)?;
        Ok(ActivationOutcome {
            rolls,
            activation,
            upcast: None,
        })
    }

    fn primary_damage_options(
        &self,
        roll_mode: Option<i32>,
        can_crit: Option<bool>,
        can_miss: Option<bool>,
        overrides: &DialogOverrides,
    ) -> RollOptions {
        let mut options = RollOptions::new()
            .with_roll_mode(roll_mode.unwrap_or(0))
            .with_can_crit(can_crit.unwrap_or(true))
            .with_can_miss(can_miss.unwrap_or(true));

        if self.config.honor_dialog_overrides {
            if let Some(mode) = overrides.roll_mode {
                options = options.with_roll_mode(mode);
            }
            if let Some(value) = overrides.primary_die_value {
                options = options.with_primary_die_value(value);
            }
        }
        options
    }
}
