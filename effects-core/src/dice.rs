//! Dice notation and the roll evaluation seam.
//!
//! Supports `XdY+Z`, keep highest/lowest (`4d6kh3`), `@path` references into
//! actor roll data, and roll modes that add dice to the primary component.
//! [`DiceEngine`] is the boundary the activation resolver rolls through;
//! [`StandardDice`] is the in-process implementation.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Most dice a single expression may roll, roll-mode dice included.
pub const MAX_DICE: u32 = 1000;

/// Error type for dice parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiceError {
    #[error("Invalid dice notation: {0}")]
    InvalidNotation(String),
    #[error("Invalid die size: {0}")]
    InvalidDieSize(u32),
    #[error("No dice specified")]
    NoDice,
    #[error("Cannot keep {keep} dice when only rolling {count} (in {notation})")]
    InvalidKeepCount {
        keep: u32,
        count: u32,
        notation: String,
    },
    #[error("Cannot roll {count} dice at once (limit {max})")]
    TooManyDice { count: u64, max: u32 },
}

/// Which dice of a component count toward the total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Keep {
    Highest(u32),
    Lowest(u32),
}

/// A single die component of a dice expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiceComponent {
    pub count: u32,
    pub sides: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep: Option<Keep>,
}

/// A complete dice expression (e.g., 2d6+3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiceExpression {
    pub components: Vec<DiceComponent>,
    pub modifier: i64,
    pub original: String,
}

impl DiceExpression {
    /// Parse a dice notation string.
    pub fn parse(notation: &str) -> Result<Self, DiceError> {
        let notation = notation.trim().to_lowercase();
        if notation.is_empty() {
            return Err(DiceError::NoDice);
        }

        let mut components = Vec::new();
        let mut modifier: i64 = 0;
        let mut current = String::new();
        let mut sign: i64 = 1;

        for ch in notation.chars() {
            match ch {
                '+' | '-' => {
                    if !current.is_empty() {
                        Self::parse_component(&current, sign, &mut components, &mut modifier)?;
                        current.clear();
                    }
                    sign = if ch == '+' { 1 } else { -1 };
                }
                ' ' => continue,
                _ => current.push(ch),
            }
        }

        if !current.is_empty() {
            Self::parse_component(&current, sign, &mut components, &mut modifier)?;
        }

        if components.is_empty() && modifier == 0 && !notation.chars().any(|c| c.is_ascii_digit()) {
            return Err(DiceError::NoDice);
        }

        Ok(DiceExpression {
            components,
            modifier,
            original: notation,
        })
    }

    fn parse_component(
        s: &str,
        sign: i64,
        components: &mut Vec<DiceComponent>,
        modifier: &mut i64,
    ) -> Result<(), DiceError> {
        let invalid = || DiceError::InvalidNotation(s.to_string());

        let Some(d_pos) = s.find('d') else {
            let value: i64 = s.parse().map_err(|_| invalid())?;
            *modifier += sign * value;
            return Ok(());
        };

        // Subtracted dice are not part of this notation.
        if sign < 0 {
            return Err(invalid());
        }

        let count_str = &s[..d_pos];
        let rest = &s[d_pos + 1..];

        let count: u32 = if count_str.is_empty() {
            1
        } else {
            count_str.parse().map_err(|_| invalid())?
        };
        if count > MAX_DICE {
            return Err(DiceError::TooManyDice {
                count: u64::from(count),
                max: MAX_DICE,
            });
        }

        let (sides_str, keep) = if let Some(kh_pos) = rest.find("kh") {
            let keep: u32 = rest[kh_pos + 2..].parse().map_err(|_| invalid())?;
            (&rest[..kh_pos], Some(Keep::Highest(keep)))
        } else if let Some(kl_pos) = rest.find("kl") {
            let keep: u32 = rest[kl_pos + 2..].parse().map_err(|_| invalid())?;
            (&rest[..kl_pos], Some(Keep::Lowest(keep)))
        } else {
            (rest, None)
        };

        let sides: u32 = sides_str.parse().map_err(|_| invalid())?;
        if sides == 0 {
            return Err(DiceError::InvalidDieSize(sides));
        }

        if let Some(Keep::Highest(keep) | Keep::Lowest(keep)) = keep {
            if keep > count {
                return Err(DiceError::InvalidKeepCount {
                    keep,
                    count,
                    notation: s.to_string(),
                });
            }
        }

        components.push(DiceComponent { count, sides, keep });
        Ok(())
    }

    /// Roll with a specific RNG (useful for testing).
    pub fn roll_with_rng<R: Rng>(&self, rng: &mut R) -> Result<RollResult, DiceError> {
        self.roll_with_options(&RollOptions::default(), rng)
    }

    /// Roll honoring roll mode, primary-die override and crit/miss rules.
    ///
    /// The primary die is the first kept die of the first component. A
    /// positive roll mode adds that many dice to the first component and keeps
    /// the highest; a negative one keeps the lowest. A forced primary value
    /// stays kept and stays first, whatever the roll mode.
    pub fn roll_with_options<R: Rng>(
        &self,
        options: &RollOptions,
        rng: &mut R,
    ) -> Result<RollResult, DiceError> {
        let mut component_results = Vec::with_capacity(self.components.len());
        let mut dice_rolled: u64 = 0;

        for (index, component) in self.components.iter().enumerate() {
            let (count, keep) = if index == 0 && options.roll_mode != 0 {
                let kept = match component.keep {
                    Some(Keep::Highest(n) | Keep::Lowest(n)) => n,
                    None => component.count,
                };
                let extra = options.roll_mode.unsigned_abs();
                let keep = if options.roll_mode > 0 {
                    Keep::Highest(kept)
                } else {
                    Keep::Lowest(kept)
                };
                (u64::from(component.count) + u64::from(extra), Some(keep))
            } else {
                (u64::from(component.count), component.keep)
            };
            dice_rolled += count;
            if dice_rolled > u64::from(MAX_DICE) {
                return Err(DiceError::TooManyDice {
                    count: dice_rolled,
                    max: MAX_DICE,
                });
            }

            let mut rolls: Vec<u32> = (0..count)
                .map(|_| rng.gen_range(1..=component.sides))
                .collect();
            let mut kept_indices = select_kept(&rolls, keep);

            if index == 0 {
                let primary = kept_indices.first().copied();
                if let (Some(value), Some(primary)) = (options.primary_die_value, primary) {
                    rolls[primary] = value.clamp(1, component.sides);
                    kept_indices = pin_primary(&rolls, keep, primary);
                }
            }

            let kept: Vec<u32> = kept_indices.iter().map(|&i| rolls[i]).collect();
            let subtotal = kept.iter().map(|&r| u64::from(r)).sum();
            component_results.push(ComponentResult {
                sides: component.sides,
                rolls,
                kept,
                subtotal,
            });
        }

        let primary = component_results
            .first()
            .and_then(|c| c.kept.first().map(|&value| (value, c.sides)));
        let is_critical = options.can_crit && matches!(primary, Some((value, sides)) if value == sides);
        let is_miss = options.can_miss && matches!(primary, Some((1, _)));

        let dice_total: i64 = component_results.iter().map(|c| c.subtotal as i64).sum();
        let total = if is_miss { 0 } else { dice_total + self.modifier };

        Ok(RollResult {
            formula: self.original.clone(),
            component_results,
            modifier: self.modifier,
            total,
            is_critical,
            is_miss,
        })
    }
}

// Indices of the kept dice, in roll order.
fn select_kept(rolls: &[u32], keep: Option<Keep>) -> Vec<usize> {
    select_from(rolls, (0..rolls.len()).collect(), keep)
}

// Kept indices with `primary` first; the other slots follow the keep rule.
fn pin_primary(rolls: &[u32], keep: Option<Keep>, primary: usize) -> Vec<usize> {
    let others = (0..rolls.len()).filter(|&i| i != primary).collect();
    let rest = keep.map(|keep| match keep {
        Keep::Highest(n) => Keep::Highest(n.saturating_sub(1)),
        Keep::Lowest(n) => Keep::Lowest(n.saturating_sub(1)),
    });
    let mut kept = vec![primary];
    kept.extend(select_from(rolls, others, rest));
    kept
}

fn select_from(rolls: &[u32], mut order: Vec<usize>, keep: Option<Keep>) -> Vec<usize> {
    let n = match keep {
        None => return order,
        Some(Keep::Highest(n)) => {
            order.sort_by(|&a, &b| rolls[b].cmp(&rolls[a]));
            n
        }
        Some(Keep::Lowest(n)) => {
            order.sort_by(|&a, &b| rolls[a].cmp(&rolls[b]));
            n
        }
    };
    order.truncate(n as usize);
    order.sort_unstable();
    order
}

impl FromStr for DiceExpression {
    type Err = DiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DiceExpression::parse(s)
    }
}

impl fmt::Display for DiceExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.original)
    }
}

/// Replace `@path` references with values from `roll_data`.
///
/// Paths are dotted (`@abilities.str.mod`). Missing or non-numeric values
/// resolve to `0`.
pub fn substitute_references(formula: &str, roll_data: &Value) -> String {
    let mut out = String::with_capacity(formula.len());
    let mut chars = formula.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '@' {
            out.push(ch);
            continue;
        }
        let mut path = String::new();
        while let Some(&next) = chars.peek() {
            if next.is_ascii_alphanumeric() || next == '_' || next == '.' {
                path.push(next);
                chars.next();
            } else {
                break;
            }
        }
        let path = path.trim_end_matches('.');
        let value = lookup(roll_data, path);
        if value.is_none() {
            warn!(reference = path, "Unresolved roll data reference; using 0");
        }
        out.push_str(&value.unwrap_or_else(|| "0".to_string()));
    }
    out
}

fn lookup(data: &Value, path: &str) -> Option<String> {
    if path.is_empty() {
        return None;
    }
    let value = path.split('.').try_fold(data, |value, key| value.get(key))?;
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

/// Result of rolling a single dice component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentResult {
    pub sides: u32,
    pub rolls: Vec<u32>,
    pub kept: Vec<u32>,
    pub subtotal: u64,
}

/// Complete result of a dice roll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollResult {
    pub formula: String,
    pub component_results: Vec<ComponentResult>,
    pub modifier: i64,
    pub total: i64,
    pub is_critical: bool,
    pub is_miss: bool,
}

impl RollResult {
    /// Format the individual dice results for display.
    pub fn dice_display(&self) -> String {
        let dice_parts: Vec<String> = self
            .component_results
            .iter()
            .map(|c| {
                let mut unused = c.kept.clone();
                let shown: Vec<String> = c
                    .rolls
                    .iter()
                    .map(|&roll| match unused.iter().position(|&k| k == roll) {
                        Some(i) => {
                            unused.remove(i);
                            roll.to_string()
                        }
                        None => format!("({roll})"),
                    })
                    .collect();
                format!("[{}]", shown.join(", "))
            })
            .collect();

        let dice_str = dice_parts.join(" + ");
        match self.modifier {
            0 => dice_str,
            m if dice_str.is_empty() => m.to_string(),
            m if m > 0 => format!("{} + {}", dice_str, m),
            m => format!("{} - {}", dice_str, m.abs()),
        }
    }
}

impl fmt::Display for RollResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.dice_display(), self.total)
    }
}

/// What a roll is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RollKind {
    Damage,
    Healing,
    SavingThrow,
}

/// Rules applied while evaluating a formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollOptions {
    /// Positive adds dice and keeps the highest, negative keeps the lowest.
    #[serde(default)]
    pub roll_mode: i32,
    /// Forced value for the primary die.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_die_value: Option<u32>,
    /// Primary die at its maximum marks a critical.
    #[serde(default)]
    pub can_crit: bool,
    /// Primary die showing 1 is a miss and totals 0.
    #[serde(default)]
    pub can_miss: bool,
}

impl RollOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_roll_mode(mut self, roll_mode: i32) -> Self {
        self.roll_mode = roll_mode;
        self
    }

    pub fn with_primary_die_value(mut self, value: u32) -> Self {
        self.primary_die_value = Some(value);
        self
    }

    pub fn with_can_crit(mut self, can_crit: bool) -> Self {
        self.can_crit = can_crit;
        self
    }

    pub fn with_can_miss(mut self, can_miss: bool) -> Self {
        self.can_miss = can_miss;
        self
    }
}

/// A formula to evaluate against an actor's roll data.
#[derive(Debug, Clone, PartialEq)]
pub struct RollRequest {
    pub kind: RollKind,
    pub formula: String,
    pub roll_data: Value,
    pub options: RollOptions,
}

impl RollRequest {
    pub fn new(kind: RollKind, formula: impl Into<String>, roll_data: Value) -> Self {
        Self {
            kind,
            formula: formula.into(),
            roll_data,
            options: RollOptions::default(),
        }
    }

    pub fn with_options(mut self, options: RollOptions) -> Self {
        self.options = options;
        self
    }
}

/// An evaluated roll, ready to be stored on a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluatedRoll {
    pub formula: String,
    pub total: i64,
    /// Serialized engine result, written to the node's `roll` field.
    pub data: Value,
}

/// Error type for roll evaluation.
#[derive(Debug, Error)]
pub enum RollError {
    #[error("Cannot evaluate '{formula}': {source}")]
    Formula {
        formula: String,
        #[source]
        source: DiceError,
    },

    #[error("Dice engine error: {0}")]
    Engine(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Evaluates roll formulas.
///
/// Implementations may suspend (e.g. a host that animates dice); callers
/// evaluate one roll at a time.
#[async_trait]
pub trait DiceEngine: Send + Sync {
    async fn evaluate(&self, request: &RollRequest) -> Result<EvaluatedRoll, RollError>;
}

/// In-process dice engine with its own RNG.
pub struct StandardDice {
    rng: Mutex<StdRng>,
}

impl StandardDice {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic engine for tests and replays.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Default for StandardDice {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DiceEngine for StandardDice {
    async fn evaluate(&self, request: &RollRequest) -> Result<EvaluatedRoll, RollError> {
        let formula = substitute_references(&request.formula, &request.roll_data);
        let expression = DiceExpression::parse(&formula).map_err(|source| RollError::Formula {
            formula: formula.clone(),
            source,
        })?;

        let result = {
            let mut rng = self.rng.lock().await;
            expression.roll_with_options(&request.options, &mut *rng)
        }
        .map_err(|source| RollError::Formula {
            formula: formula.clone(),
            source,
        })?;
        debug!(kind = ?request.kind, formula = %formula, total = result.total, "Evaluated roll");

        Ok(EvaluatedRoll {
            formula,
            total: result.total,
            data: serde_json::to_value(&result)?,
        })
    }
}
