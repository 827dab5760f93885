//! Effect node model.
//!
//! An ability's activation declares a tree of effects. Nodes reference their
//! structural owner by id (`parentNode`) and the named branch they live under
//! (`parentContext`) instead of holding pointers, so a tree can be flattened
//! into a plain list and rebuilt from it.
//!
//! The JSON shape is the persisted format and must keep its field names:
//!
//! ```json
//! {
//!   "type": "damage",
//!   "id": "d1",
//!   "parentContext": null,
//!   "parentNode": null,
//!   "damageType": "fire",
//!   "formula": "2d6",
//!   "on": { "hit": [{ "type": "damageOutcome", "id": "o1", "outcome": "fullDamage",
//!                     "parentContext": "hit", "parentNode": "d1" }] }
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Identifier of a node, unique within one tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh random id for nodes created at runtime.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Error parsing a branch name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BranchParseError {
    #[error("Unknown branch: {0}")]
    Unknown(String),
    #[error("Invalid failedSaveBy margin in '{0}'")]
    InvalidMargin(String),
}

/// A named branch a child node lives under.
///
/// On the wire this is the `parentContext` string. Margin buckets are
/// written as `failedSaveBy.<N>`. A bare `failedSaveBy` reads as margin 0;
/// inside a `failedSaveBy` bucket it takes the bucket's margin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Branch {
    CriticalHit,
    Hit,
    Miss,
    PassedSave,
    FailedSave,
    /// Fails the save by at least this margin.
    FailedSaveBy(u32),
    /// Reserved marker for damage nodes in a saving throw's `sharedRolls`.
    SharedRolls,
}

impl Branch {
    const MARGIN_PREFIX: &'static str = "failedSaveBy.";
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Branch::CriticalHit => f.write_str("criticalHit"),
            Branch::Hit => f.write_str("hit"),
            Branch::Miss => f.write_str("miss"),
            Branch::PassedSave => f.write_str("passedSave"),
            Branch::FailedSave => f.write_str("failedSave"),
            Branch::FailedSaveBy(margin) => write!(f, "{}{}", Self::MARGIN_PREFIX, margin),
            Branch::SharedRolls => f.write_str("sharedRolls"),
        }
    }
}

impl FromStr for Branch {
    type Err = BranchParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "criticalHit" => Ok(Branch::CriticalHit),
            "hit" => Ok(Branch::Hit),
            "miss" => Ok(Branch::Miss),
            "passedSave" => Ok(Branch::PassedSave),
            "failedSave" => Ok(Branch::FailedSave),
            "sharedRolls" => Ok(Branch::SharedRolls),
            "failedSaveBy" => Ok(Branch::FailedSaveBy(0)),
            other => match other.strip_prefix(Self::MARGIN_PREFIX) {
                Some(margin) => margin
                    .parse()
                    .map(Branch::FailedSaveBy)
                    .map_err(|_| BranchParseError::InvalidMargin(other.to_string())),
                None => Err(BranchParseError::Unknown(other.to_string())),
            },
        }
    }
}

impl TryFrom<String> for Branch {
    type Error = BranchParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Branch> for String {
    fn from(branch: Branch) -> Self {
        branch.to_string()
    }
}

/// Child effects keyed by the outcome that triggers them.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionConsequence {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub critical_hit: Vec<EffectNode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hit: Vec<EffectNode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub miss: Vec<EffectNode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub passed_save: Vec<EffectNode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_save: Vec<EffectNode>,
    /// Sparse buckets: key `N` fires when the save fails by at least `N`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty", with = "margin_keys")]
    pub failed_save_by: BTreeMap<u32, Vec<EffectNode>>,
}

impl ActionConsequence {
    /// Every branch in canonical order, margin buckets ascending.
    pub fn branches(&self) -> impl Iterator<Item = (Branch, &[EffectNode])> {
        [
            (Branch::CriticalHit, self.critical_hit.as_slice()),
            (Branch::Hit, self.hit.as_slice()),
            (Branch::Miss, self.miss.as_slice()),
            (Branch::PassedSave, self.passed_save.as_slice()),
            (Branch::FailedSave, self.failed_save.as_slice()),
        ]
        .into_iter()
        .chain(
            self.failed_save_by
                .iter()
                .map(|(margin, nodes)| (Branch::FailedSaveBy(*margin), nodes.as_slice())),
        )
    }

    /// The exact bucket for `branch`, if it exists.
    pub fn branch(&self, branch: Branch) -> Option<&[EffectNode]> {
        match branch {
            Branch::CriticalHit => Some(&self.critical_hit),
            Branch::Hit => Some(&self.hit),
            Branch::Miss => Some(&self.miss),
            Branch::PassedSave => Some(&self.passed_save),
            Branch::FailedSave => Some(&self.failed_save),
            Branch::FailedSaveBy(margin) => self.failed_save_by.get(&margin).map(Vec::as_slice),
            Branch::SharedRolls => None,
        }
    }

    /// Mutable bucket for `branch`, creating a margin bucket on demand.
    pub fn branch_mut(&mut self, branch: Branch) -> Option<&mut Vec<EffectNode>> {
        match branch {
            Branch::CriticalHit => Some(&mut self.critical_hit),
            Branch::Hit => Some(&mut self.hit),
            Branch::Miss => Some(&mut self.miss),
            Branch::PassedSave => Some(&mut self.passed_save),
            Branch::FailedSave => Some(&mut self.failed_save),
            Branch::FailedSaveBy(margin) => Some(self.failed_save_by.entry(margin).or_default()),
            Branch::SharedRolls => None,
        }
    }

    /// Nodes that fire when `context` occurred.
    ///
    /// A save failed by `M` satisfies every margin bucket `N <= M`.
    pub fn matching(&self, context: Branch) -> Vec<&EffectNode> {
        match context {
            Branch::FailedSaveBy(margin) => self
                .failed_save_by
                .range(..=margin)
                .flat_map(|(_, nodes)| nodes.iter())
                .collect(),
            other => self.branch(other).map(|n| n.iter().collect()).unwrap_or_default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.branches().all(|(_, nodes)| nodes.is_empty())
    }

    /// Same bucket layout with every bucket emptied.
    pub fn emptied(&self) -> Self {
        Self {
            failed_save_by: self
                .failed_save_by
                .keys()
                .map(|margin| (*margin, Vec::new()))
                .collect(),
            ..Self::default()
        }
    }
}

/// `failedSaveBy` keys are integers but JSON object keys are strings.
mod margin_keys {
    use super::{Branch, EffectNode};
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::BTreeMap;

    pub fn serialize<S: Serializer>(
        map: &BTreeMap<u32, Vec<EffectNode>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        map.iter()
            .map(|(margin, nodes)| (margin.to_string(), nodes))
            .collect::<BTreeMap<_, _>>()
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<u32, Vec<EffectNode>>, D::Error> {
        BTreeMap::<String, Vec<EffectNode>>::deserialize(deserializer)?
            .into_iter()
            .map(|(key, nodes)| {
                key.trim()
                    .parse::<u32>()
                    .map(|margin| (margin, with_margin(nodes, margin)))
                    .map_err(|_| D::Error::custom(format!("invalid failedSaveBy margin: {key}")))
            })
            .collect()
    }

    // Bare `failedSaveBy` contexts parse as margin 0; the bucket knows better.
    fn with_margin(mut nodes: Vec<EffectNode>, margin: u32) -> Vec<EffectNode> {
        for node in nodes.iter_mut() {
            if node.parent_context() != Some(Branch::FailedSaveBy(0)) {
                continue;
            }
            if let Some(parent) = node.parent_node().cloned() {
                node.set_link(Some((Branch::FailedSaveBy(margin), parent)));
            }
        }
        nodes
    }
}

/// Which slice of a damage roll an outcome node applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DamageOutcome {
    FullDamage,
    HalfDamage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HealingType {
    Healing,
    TemporaryHealing,
}

/// A rollable damage effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DamageNode {
    pub id: NodeId,
    #[serde(default)]
    pub parent_context: Option<Branch>,
    #[serde(default)]
    pub parent_node: Option<NodeId>,
    pub damage_type: String,
    pub formula: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub can_crit: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub can_miss: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignore_armor: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignore_allies: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on: Option<ActionConsequence>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roll: Option<Value>,
    /// Positive for advantage, negative for disadvantage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roll_mode: Option<i32>,
}

impl DamageNode {
    pub fn new(id: impl Into<NodeId>, damage_type: impl Into<String>, formula: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parent_context: None,
            parent_node: None,
            damage_type: damage_type.into(),
            formula: formula.into(),
            can_crit: None,
            can_miss: None,
            ignore_armor: None,
            ignore_allies: None,
            on: None,
            roll: None,
            roll_mode: None,
        }
    }

    /// Add `child` under `branch`, linking it to this node.
    pub fn with_child(mut self, branch: Branch, child: impl Into<EffectNode>) -> Self {
        attach_child(&self.id, &mut self.on, branch, child.into());
        self
    }

    /// Copy of this node without any children.
    pub fn detached(&self) -> Self {
        Self {
            on: self.on.as_ref().map(ActionConsequence::emptied),
            ..self.clone_shallow()
        }
    }

    fn clone_shallow(&self) -> Self {
        Self {
            id: self.id.clone(),
            parent_context: self.parent_context,
            parent_node: self.parent_node.clone(),
            damage_type: self.damage_type.clone(),
            formula: self.formula.clone(),
            can_crit: self.can_crit,
            can_miss: self.can_miss,
            ignore_armor: self.ignore_armor,
            ignore_allies: self.ignore_allies,
            on: None,
            roll: self.roll.clone(),
            roll_mode: self.roll_mode,
        }
    }
}

/// A computed slice of a damage node's result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DamageOutcomeNode {
    pub id: NodeId,
    #[serde(default)]
    pub parent_context: Option<Branch>,
    #[serde(default)]
    pub parent_node: Option<NodeId>,
    pub outcome: DamageOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub damage_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignore_armor: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignore_allies: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roll: Option<Value>,
}

impl DamageOutcomeNode {
    pub fn new(id: impl Into<NodeId>, outcome: DamageOutcome) -> Self {
        Self {
            id: id.into(),
            parent_context: None,
            parent_node: None,
            outcome,
            damage_type: None,
            ignore_armor: None,
            ignore_allies: None,
            roll: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealingNode {
    pub id: NodeId,
    #[serde(default)]
    pub parent_context: Option<Branch>,
    #[serde(default)]
    pub parent_node: Option<NodeId>,
    pub healing_type: HealingType,
    pub formula: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roll: Option<Value>,
}

impl HealingNode {
    pub fn new(id: impl Into<NodeId>, healing_type: HealingType, formula: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parent_context: None,
            parent_node: None,
            healing_type,
            formula: formula.into(),
            roll: None,
        }
    }
}

/// A saving throw, optionally sharing damage rolls across its outcome branches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavingThrowNode {
    pub id: NodeId,
    #[serde(default)]
    pub parent_context: Option<Branch>,
    #[serde(default)]
    pub parent_node: Option<NodeId>,
    #[serde(rename = "saveDC", default, skip_serializing_if = "Option::is_none")]
    pub save_dc: Option<i32>,
    pub saving_throw_type: String,
    /// Rolled once per activation and reused by every outcome branch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared_rolls: Option<Vec<DamageNode>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on: Option<ActionConsequence>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roll: Option<Value>,
}

impl SavingThrowNode {
    pub fn new(id: impl Into<NodeId>, saving_throw_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parent_context: None,
            parent_node: None,
            save_dc: None,
            saving_throw_type: saving_throw_type.into(),
            shared_rolls: None,
            on: None,
            roll: None,
        }
    }

    pub fn with_dc(mut self, dc: i32) -> Self {
        self.save_dc = Some(dc);
        self
    }

    pub fn with_child(mut self, branch: Branch, child: impl Into<EffectNode>) -> Self {
        attach_child(&self.id, &mut self.on, branch, child.into());
        self
    }

    pub fn with_shared_roll(mut self, mut damage: DamageNode) -> Self {
        damage.parent_context = Some(Branch::SharedRolls);
        damage.parent_node = Some(self.id.clone());
        self.shared_rolls.get_or_insert_with(Vec::new).push(damage);
        self
    }

    pub fn detached(&self) -> Self {
        Self {
            id: self.id.clone(),
            parent_context: self.parent_context,
            parent_node: self.parent_node.clone(),
            save_dc: self.save_dc,
            saving_throw_type: self.saving_throw_type.clone(),
            shared_rolls: self.shared_rolls.as_ref().map(|_| Vec::new()),
            on: self.on.as_ref().map(ActionConsequence::emptied),
            roll: self.roll.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionNode {
    pub id: NodeId,
    #[serde(default)]
    pub parent_context: Option<Branch>,
    #[serde(default)]
    pub parent_node: Option<NodeId>,
    pub condition: String,
}

impl ConditionNode {
    pub fn new(id: impl Into<NodeId>, condition: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parent_context: None,
            parent_node: None,
            condition: condition.into(),
        }
    }
}

/// Display-only text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteNode {
    pub id: NodeId,
    #[serde(default)]
    pub parent_context: Option<Branch>,
    #[serde(default)]
    pub parent_node: Option<NodeId>,
    pub note_type: String,
    pub text: String,
}

impl NoteNode {
    pub fn new(id: impl Into<NodeId>, note_type: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parent_context: None,
            parent_node: None,
            note_type: note_type.into(),
            text: text.into(),
        }
    }
}

/// One node of an effect tree, tagged by `type` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EffectNode {
    Damage(DamageNode),
    DamageOutcome(DamageOutcomeNode),
    Healing(HealingNode),
    SavingThrow(SavingThrowNode),
    Condition(ConditionNode),
    Note(NoteNode),
}

impl EffectNode {
    pub fn id(&self) -> &NodeId {
        match self {
            EffectNode::Damage(n) => &n.id,
            EffectNode::DamageOutcome(n) => &n.id,
            EffectNode::Healing(n) => &n.id,
            EffectNode::SavingThrow(n) => &n.id,
            EffectNode::Condition(n) => &n.id,
            EffectNode::Note(n) => &n.id,
        }
    }

    pub fn parent_context(&self) -> Option<Branch> {
        match self {
            EffectNode::Damage(n) => n.parent_context,
            EffectNode::DamageOutcome(n) => n.parent_context,
            EffectNode::Healing(n) => n.parent_context,
            EffectNode::SavingThrow(n) => n.parent_context,
            EffectNode::Condition(n) => n.parent_context,
            EffectNode::Note(n) => n.parent_context,
        }
    }

    pub fn parent_node(&self) -> Option<&NodeId> {
        match self {
            EffectNode::Damage(n) => n.parent_node.as_ref(),
            EffectNode::DamageOutcome(n) => n.parent_node.as_ref(),
            EffectNode::Healing(n) => n.parent_node.as_ref(),
            EffectNode::SavingThrow(n) => n.parent_node.as_ref(),
            EffectNode::Condition(n) => n.parent_node.as_ref(),
            EffectNode::Note(n) => n.parent_node.as_ref(),
        }
    }

    /// Overwrite both structural links. `None` makes this a root node.
    pub fn set_link(&mut self, link: Option<(Branch, NodeId)>) {
        let (context, parent) = match link {
            Some((branch, parent)) => (Some(branch), Some(parent)),
            None => (None, None),
        };
        let (slot_context, slot_parent) = match self {
            EffectNode::Damage(n) => (&mut n.parent_context, &mut n.parent_node),
            EffectNode::DamageOutcome(n) => (&mut n.parent_context, &mut n.parent_node),
            EffectNode::Healing(n) => (&mut n.parent_context, &mut n.parent_node),
            EffectNode::SavingThrow(n) => (&mut n.parent_context, &mut n.parent_node),
            EffectNode::Condition(n) => (&mut n.parent_context, &mut n.parent_node),
            EffectNode::Note(n) => (&mut n.parent_context, &mut n.parent_node),
        };
        *slot_context = context;
        *slot_parent = parent;
    }

    pub fn is_root(&self) -> bool {
        self.parent_node().is_none()
    }

    /// Wire name of the variant.
    pub fn type_name(&self) -> &'static str {
        match self {
            EffectNode::Damage(_) => "damage",
            EffectNode::DamageOutcome(_) => "damageOutcome",
            EffectNode::Healing(_) => "healing",
            EffectNode::SavingThrow(_) => "savingThrow",
            EffectNode::Condition(_) => "condition",
            EffectNode::Note(_) => "note",
        }
    }

    /// Whether the node is evaluated against the dice engine.
    pub fn is_rollable(&self) -> bool {
        matches!(
            self,
            EffectNode::Damage(_) | EffectNode::Healing(_) | EffectNode::SavingThrow(_)
        )
    }

    pub fn consequence(&self) -> Option<&ActionConsequence> {
        match self {
            EffectNode::Damage(n) => n.on.as_ref(),
            EffectNode::SavingThrow(n) => n.on.as_ref(),
            EffectNode::DamageOutcome(_)
            | EffectNode::Healing(_)
            | EffectNode::Condition(_)
            | EffectNode::Note(_) => None,
        }
    }

    pub fn shared_rolls(&self) -> &[DamageNode] {
        match self {
            EffectNode::SavingThrow(n) => n.shared_rolls.as_deref().unwrap_or_default(),
            _ => &[],
        }
    }

    pub fn roll(&self) -> Option<&Value> {
        match self {
            EffectNode::Damage(n) => n.roll.as_ref(),
            EffectNode::DamageOutcome(n) => n.roll.as_ref(),
            EffectNode::Healing(n) => n.roll.as_ref(),
            EffectNode::SavingThrow(n) => n.roll.as_ref(),
            EffectNode::Condition(_) | EffectNode::Note(_) => None,
        }
    }

    /// Attach an evaluated roll. Returns false for nodes that never carry one.
    pub fn set_roll(&mut self, roll: Value) -> bool {
        let slot = match self {
            EffectNode::Damage(n) => &mut n.roll,
            EffectNode::DamageOutcome(n) => &mut n.roll,
            EffectNode::Healing(n) => &mut n.roll,
            EffectNode::SavingThrow(n) => &mut n.roll,
            EffectNode::Condition(_) | EffectNode::Note(_) => return false,
        };
        *slot = Some(roll);
        true
    }

    /// Copy of this node with every child bucket emptied but kept in shape.
    pub fn detached(&self) -> EffectNode {
        match self {
            EffectNode::Damage(n) => EffectNode::Damage(n.detached()),
            EffectNode::SavingThrow(n) => EffectNode::SavingThrow(n.detached()),
            other => other.clone(),
        }
    }

    /// Remove every child, keeping bucket shape.
    pub fn clear_children(&mut self) {
        match self {
            EffectNode::Damage(n) => n.on = n.on.as_ref().map(ActionConsequence::emptied),
            EffectNode::SavingThrow(n) => {
                n.on = n.on.as_ref().map(ActionConsequence::emptied);
                if let Some(shared) = n.shared_rolls.as_mut() {
                    shared.clear();
                }
            }
            EffectNode::DamageOutcome(_)
            | EffectNode::Healing(_)
            | EffectNode::Condition(_)
            | EffectNode::Note(_) => {}
        }
    }
}

fn attach_child(
    owner: &NodeId,
    on: &mut Option<ActionConsequence>,
    branch: Branch,
    mut child: EffectNode,
) {
    child.set_link(Some((branch, owner.clone())));
    if let Some(bucket) = on.get_or_insert_with(ActionConsequence::default).branch_mut(branch) {
        bucket.push(child);
    }
}

impl From<DamageNode> for EffectNode {
    fn from(node: DamageNode) -> Self {
        EffectNode::Damage(node)
    }
}

impl From<DamageOutcomeNode> for EffectNode {
    fn from(node: DamageOutcomeNode) -> Self {
        EffectNode::DamageOutcome(node)
    }
}

impl From<HealingNode> for EffectNode {
    fn from(node: HealingNode) -> Self {
        EffectNode::Healing(node)
    }
}

impl From<SavingThrowNode> for EffectNode {
    fn from(node: SavingThrowNode) -> Self {
        EffectNode::SavingThrow(node)
    }
}

impl From<ConditionNode> for EffectNode {
    fn from(node: ConditionNode) -> Self {
        EffectNode::Condition(node)
    }
}

impl From<NoteNode> for EffectNode {
    fn from(node: NoteNode) -> Self {
        EffectNode::Note(node)
    }
}
