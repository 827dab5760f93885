//! Conditional combat effect trees.
//!
//! This crate provides:
//! - The effect node model and its nested `on` consequence branches
//! - Flattening to an ordered node list and rebuilding the tree from it
//! - Context extraction ("what fires on a critical hit?") and display grouping
//! - Upcast validation and scaling of spell activations by spent mana
//! - Activation resolution through a pluggable async dice engine
//!
//! # Quick Start
//!
//! ```ignore
//! use effects_core::{
//!     ActivationResolver, Branch, DialogOverrides, ItemDocument, StandardDice,
//!     UpcastRequest, get_relevant_nodes, RelevanceOptions,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let item: ItemDocument = serde_json::from_str(&std::fs::read_to_string("fireball.json")?)?;
//!     let resolver = ActivationResolver::new(StandardDice::new());
//!
//!     let outcome = resolver
//!         .resolve_upcast(&item, &actor, &DialogOverrides::default(), UpcastRequest::new(4))
//!         .await?;
//!
//!     let on_fail = get_relevant_nodes(
//!         &outcome.activation.effects,
//!         &[Branch::FailedSave],
//!         RelevanceOptions::new(),
//!     );
//!     println!("{} rolls, {} groups on a failed save", outcome.rolls.len(), on_fail.len());
//!     Ok(())
//! }
//! ```

pub mod activation;
pub mod context;
pub mod dice;
pub mod grouping;
pub mod node;
pub mod resolve;
pub mod testing;
pub mod tree;
pub mod upcast;

// Primary public API
pub use activation::{ActivationData, ActorDocument, ItemDocument, ItemType};
pub use context::{damage_source_of, find_nodes_by_contexts, get_relevant_nodes, RelevanceOptions};
pub use dice::{DiceEngine, EvaluatedRoll, RollError, RollKind, RollOptions, RollRequest, StandardDice};
pub use grouping::group_nodes;
pub use node::{ActionConsequence, Branch, EffectNode, NodeId};
pub use resolve::{
    ActivationConfig, ActivationError, ActivationOutcome, ActivationResolver, DialogOverrides,
};
pub use testing::{ScriptedDice, TestActor};
pub use tree::{flatten, reconstruct, TreeError};
pub use upcast::{
    apply_upcast_deltas, validate_upcast, CasterState, DeltaOperation, ScalingDelta, SpellScaling,
    UpcastContext, UpcastError, UpcastRequest, UpcastResult, ValidationResult,
};
