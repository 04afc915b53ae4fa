// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The flow state machine.
//!
//! One call to [`FlowEngine::run_pass`] executes nodes from the
//! conversation's current position until a node suspends, the flow ends, or
//! an error stops the pass. The caller holds the session lock for the whole
//! call and persists the conversation afterwards.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use parley_core::traits::{DeliveryGateway, PromptExecutor};
use parley_core::types::{Conversation, ExecutionStatus, OutboundMessage, PromptSpec};
use parley_core::ParleyError;
use tracing::{debug, warn};

use crate::condition::select_rule;
use crate::definition::{FlowDefinition, Node, NodeKind};

/// What started the pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassInput<'a> {
    /// An inbound user message.
    Message(&'a str),
    /// A delay timer firing; carries no user input.
    Timer,
}

/// How a pass ended.
#[derive(Debug)]
pub enum PassOutcome {
    /// Parked at `node_id` waiting for the user, or for a pending delay.
    Suspended { node_id: String },
    /// A delay node started; the machine should re-enter at `until`.
    Delayed { node_id: String, until: DateTime<Utc> },
    /// A `manual` node handed the conversation to a human operator.
    Handoff { node_id: String },
    /// The flow reached a dead end and is finished.
    Completed,
    /// The conversation was already completed or failed; nothing ran.
    Inactive,
    /// A pass-level failure; the position stays at `node_id` and the next
    /// inbound message retries it.
    Aborted { node_id: String, error: ParleyError },
    /// The pass failed on flow structure or a condition without a match.
    Failed { node_id: Option<String>, error: ParleyError },
}

impl PassOutcome {
    /// Stable label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            PassOutcome::Suspended { .. } => "suspended",
            PassOutcome::Delayed { .. } => "delayed",
            PassOutcome::Handoff { .. } => "handoff",
            PassOutcome::Completed => "completed",
            PassOutcome::Inactive => "inactive",
            PassOutcome::Aborted { .. } => "aborted",
            PassOutcome::Failed { .. } => "failed",
        }
    }
}

/// Summary of one pass.
#[derive(Debug)]
pub struct PassReport {
    pub outcome: PassOutcome,
    /// Nodes executed.
    pub steps: usize,
    /// Outbound messages accepted by the delivery gateway.
    pub dispatched: usize,
    /// Completion service invocations, successful or not.
    pub completion_calls: usize,
}

impl PassReport {
    fn new(outcome: PassOutcome) -> Self {
        Self {
            outcome,
            steps: 0,
            dispatched: 0,
            completion_calls: 0,
        }
    }

    /// Whether the pass counts as a bot reply for throttling.
    pub fn replied(&self) -> bool {
        self.dispatched > 0 || self.completion_calls > 0
    }
}

enum Step {
    Next(String),
    Stop(PassOutcome),
}

pub struct FlowEngine {
    delivery: Arc<dyn DeliveryGateway>,
    prompts: Arc<dyn PromptExecutor>,
    max_steps: usize,
}

impl FlowEngine {
    pub fn new(
        delivery: Arc<dyn DeliveryGateway>,
        prompts: Arc<dyn PromptExecutor>,
        max_steps: usize,
    ) -> Self {
        Self {
            delivery,
            prompts,
            max_steps,
        }
    }

    /// Runs one processing pass over `conv`.
    ///
    /// Errors never escape: they are reported through [`PassOutcome`] and the
    /// conversation is left at its last good position.
    pub async fn run_pass(
        &self,
        flow: &FlowDefinition,
        conv: &mut Conversation,
        input: PassInput<'_>,
        now: DateTime<Utc>,
    ) -> PassReport {
        if conv.execution_status != ExecutionStatus::Active {
            return PassReport::new(PassOutcome::Inactive);
        }

        let mut node_id = match conv.current_node_id.clone() {
            Some(id) => id,
            None => match flow.start_node() {
                Some(start) => {
                    conv.advance_to(&start.id);
                    start.id.clone()
                }
                None => {
                    return PassReport::new(fail_flow(conv, None, "flow has no start node"));
                }
            },
        };

        if let Some(until) = conv.delay_until
            && now < until
        {
            debug!(node_id = %node_id, %until, "delay pending, pass is a no-op");
            return PassReport::new(PassOutcome::Suspended { node_id });
        }

        let mut fresh_input = match input {
            PassInput::Message(text) => {
                conv.begin_turn(text);
                true
            }
            PassInput::Timer => false,
        };

        let mut report = PassReport::new(PassOutcome::Completed);
        loop {
            if report.steps >= self.max_steps {
                let reason = format!("exceeded {} steps in one pass", self.max_steps);
                report.outcome = fail_flow(conv, Some(node_id), &reason);
                break;
            }
            report.steps += 1;

            let Some(node) = flow.node(&node_id) else {
                let reason = format!("node `{node_id}` does not exist");
                report.outcome = fail_flow(conv, Some(node_id), &reason);
                break;
            };

            debug!(node_id = %node.id, node_type = node.kind.type_name(), "executing node");
            match self
                .execute(flow, node, conv, &mut fresh_input, now, &mut report)
                .await
            {
                Step::Next(next) => {
                    conv.advance_to(&next);
                    node_id = next;
                }
                Step::Stop(outcome) => {
                    report.outcome = outcome;
                    break;
                }
            }
        }
        report
    }

    async fn execute(
        &self,
        flow: &FlowDefinition,
        node: &Node,
        conv: &mut Conversation,
        fresh_input: &mut bool,
        now: DateTime<Utc>,
        report: &mut PassReport,
    ) -> Step {
        match &node.kind {
            NodeKind::Start => follow(flow, node, conv),

            NodeKind::Message { text } => {
                let msg = OutboundMessage::text(&conv.key, text.clone());
                if let Err(error) = self.dispatch(msg, report).await {
                    return abort(node, error);
                }
                conv.record_bot_output(text);
                follow(flow, node, conv)
            }

            NodeKind::Media { kind, url, caption } => {
                let msg = OutboundMessage::media(&conv.key, *kind, url.clone(), caption.clone());
                if let Err(error) = self.dispatch(msg, report).await {
                    return abort(node, error);
                }
                conv.record_bot_output(caption.as_deref().unwrap_or(url));
                follow(flow, node, conv)
            }

            NodeKind::Delay { seconds } => {
                if conv.delay_until.take().is_some() || *seconds == 0 {
                    return follow(flow, node, conv);
                }
                let Some(until) = i64::try_from(*seconds)
                    .ok()
                    .and_then(TimeDelta::try_seconds)
                    .and_then(|d| now.checked_add_signed(d))
                else {
                    let reason = format!("delay of {seconds}s is out of range");
                    return Step::Stop(fail_flow(conv, Some(node.id.clone()), &reason));
                };
                conv.delay_until = Some(until);
                Step::Stop(PassOutcome::Delayed {
                    node_id: node.id.clone(),
                    until,
                })
            }

            NodeKind::Condition { rules } => {
                let selected = select_rule(rules, &conv.conv_current)
                    .and_then(|rule| flow.next_for_rule(&node.id, &rule.id));
                match selected {
                    Some(target) => Step::Next(target.to_string()),
                    None => Step::Stop(PassOutcome::Failed {
                        node_id: Some(node.id.clone()),
                        error: ParleyError::ConditionNoMatch {
                            node_id: node.id.clone(),
                        },
                    }),
                }
            }

            NodeKind::Stage { stage } => {
                conv.stage = Some(stage.clone());
                follow(flow, node, conv)
            }

            NodeKind::UserReply | NodeKind::WaitingReplyTimes => {
                if conv.waiting_for_reply && *fresh_input {
                    conv.waiting_for_reply = false;
                    *fresh_input = false;
                    return follow(flow, node, conv);
                }
                conv.waiting_for_reply = true;
                Step::Stop(PassOutcome::Suspended {
                    node_id: node.id.clone(),
                })
            }

            NodeKind::AiPrompt(spec) => {
                let spec = PromptSpec {
                    prompt: spec.prompt.clone(),
                    model: None,
                };
                self.prompt(flow, node, conv, &spec, report).await
            }

            NodeKind::AdvancedAiPrompt(spec) => self.prompt(flow, node, conv, spec, report).await,

            NodeKind::Manual => {
                conv.human_override = true;
                match flow.next_of(&node.id) {
                    Some(next) => conv.advance_to(next),
                    None => conv.execution_status = ExecutionStatus::Completed,
                }
                Step::Stop(PassOutcome::Handoff {
                    node_id: node.id.clone(),
                })
            }
        }
    }

    async fn prompt(
        &self,
        flow: &FlowDefinition,
        node: &Node,
        conv: &mut Conversation,
        spec: &PromptSpec,
        report: &mut PassReport,
    ) -> Step {
        report.completion_calls += 1;
        let user_text = conv.conv_current.clone();
        match self.prompts.run_prompt(conv, spec, &user_text).await {
            Ok(outcome) => {
                report.dispatched += outcome.dispatched;
                follow(flow, node, conv)
            }
            Err(error) => abort(node, error),
        }
    }

    async fn dispatch(
        &self,
        msg: OutboundMessage,
        report: &mut PassReport,
    ) -> Result<(), ParleyError> {
        let receipt = self.delivery.send(msg).await?;
        if receipt.delivered {
            report.dispatched += 1;
        } else {
            warn!("delivery gateway accepted message but reported it undelivered");
        }
        Ok(())
    }
}

/// Moves past `node`, or finishes the flow when it has no successor.
fn follow(flow: &FlowDefinition, node: &Node, conv: &mut Conversation) -> Step {
    match flow.next_of(&node.id) {
        Some(next) => Step::Next(next.to_string()),
        None => {
            conv.execution_status = ExecutionStatus::Completed;
            Step::Stop(PassOutcome::Completed)
        }
    }
}

fn abort(node: &Node, error: ParleyError) -> Step {
    Step::Stop(PassOutcome::Aborted {
        node_id: node.id.clone(),
        error,
    })
}

/// Structural failure: the conversation cannot make progress until the flow
/// is fixed, so it is marked failed.
fn fail_flow(conv: &mut Conversation, node_id: Option<String>, reason: &str) -> PassOutcome {
    conv.execution_status = ExecutionStatus::Failed;
    PassOutcome::Failed {
        node_id,
        error: ParleyError::Flow {
            message: reason.to_string(),
        },
    }
}
