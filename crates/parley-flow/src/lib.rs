// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation flows: the authored node graph and the state machine that
//! walks it one processing pass at a time.

pub mod condition;
pub mod definition;
pub mod engine;
pub mod throttle;

pub use condition::{ConditionRule, RuleKind, select_rule};
pub use definition::{Edge, FlowDefinition, Node, NodeKind};
pub use engine::{FlowEngine, PassInput, PassOutcome, PassReport};
pub use throttle::{Throttle, ThrottleDecision};
