//! Testing utilities for activation flows.
//!
//! - `ScriptedDice` returns predetermined totals and records every request
//! - `TestActor` is an in-memory actor with mana and saving throw modifiers

use crate::activation::ActorDocument;
use crate::dice::{DiceEngine, EvaluatedRoll, RollError, RollRequest};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use tokio::sync::Mutex;

/// A dice engine that returns scripted totals in order.
///
/// Use this for deterministic tests; evaluation fails once the script runs out.
pub struct ScriptedDice {
    totals: Mutex<VecDeque<i64>>,
    requests: Mutex<Vec<RollRequest>>,
}

impl ScriptedDice {
    /// Create an engine that answers with `totals`, one per roll.
    pub fn new(totals: impl IntoIterator<Item = i64>) -> Self {
        Self {
            totals: Mutex::new(totals.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Every request evaluated so far, in order.
    pub async fn requests(&self) -> Vec<RollRequest> {
        self.requests.lock().await.clone()
    }

    /// Number of scripted totals not yet used.
    pub async fn remaining(&self) -> usize {
        self.totals.lock().await.len()
    }
}

#[async_trait]
impl DiceEngine for ScriptedDice {
    async fn evaluate(&self, request: &RollRequest) -> Result<EvaluatedRoll, RollError> {
        self.requests.lock().await.push(request.clone());
        let total = self
            .totals
            .lock()
            .await
            .pop_front()
            .ok_or_else(|| RollError::Engine("No more scripted rolls".to_string()))?;

        Ok(EvaluatedRoll {
            formula: request.formula.clone(),
            total,
            data: json!({
                "formula": request.formula,
                "total": total,
                "kind": request.kind,
            }),
        })
    }
}

/// An in-memory actor.
#[derive(Debug, Clone)]
pub struct TestActor {
    pub current_mana: u32,
    pub highest_unlocked_spell_tier: u32,
    pub saves: HashMap<String, i32>,
    pub roll_data: Value,
}

impl TestActor {
    /// An actor with no mana and no saving throws.
    pub fn new() -> Self {
        Self {
            current_mana: 0,
            highest_unlocked_spell_tier: 0,
            saves: HashMap::new(),
            roll_data: json!({}),
        }
    }

    pub fn with_mana(mut self, current: u32, highest_unlocked_spell_tier: u32) -> Self {
        self.current_mana = current;
        self.highest_unlocked_spell_tier = highest_unlocked_spell_tier;
        self
    }

    pub fn with_save(mut self, save: impl Into<String>, modifier: i32) -> Self {
        self.saves.insert(save.into(), modifier);
        self
    }

    pub fn with_roll_data(mut self, roll_data: Value) -> Self {
        self.roll_data = roll_data;
        self
    }
}

impl Default for TestActor {
    fn default() -> Self {
        Self::new()
    }
}

impl ActorDocument for TestActor {
    fn roll_data(&self) -> Value {
        self.roll_data.clone()
    }

    fn current_mana(&self) -> u32 {
        self.current_mana
    }

    fn highest_unlocked_spell_tier(&self) -> u32 {
        self.highest_unlocked_spell_tier
    }

    fn saving_throw_formula(&self, save: &str, roll_mode: i32) -> Option<String> {
        let modifier = *self.saves.get(save)?;
        let dice = match roll_mode {
            0 => "1d20".to_string(),
            m if m > 0 => format!("{}d20kh1", m + 1),
            m => format!("{}d20kl1", m.unsigned_abs() + 1),
        };
        Some(match modifier {
            0 => dice,
            m if m > 0 => format!("{dice}+{m}"),
            m => format!("{dice}-{}", m.unsigned_abs()),
        })
    }
}
