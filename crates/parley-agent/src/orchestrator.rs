// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The Conversation Orchestrator.
//!
//! Each inbound message becomes one processing pass:
//! lock → load → operator commands / human override → throttle → flow →
//! persist → release. Passes for one conversation are serialized by the
//! session lock; passes for different conversations run concurrently up to
//! `max_concurrent_passes`.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use parley_config::model::ParleyConfig;
use parley_core::traits::{
    ConversationStore, DeliveryGateway, DistributedLock, LockOutcome, PromptExecutor,
};
use parley_core::types::{Conversation, ConversationKey, InboundMessage, OutboundMessage};
use parley_core::ParleyError;
use parley_flow::{FlowDefinition, FlowEngine, PassInput, PassOutcome, Throttle, ThrottleDecision};
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::commands::{CommandParser, OperatorCommand};
use crate::scheduler::DelayScheduler;
use crate::shutdown;

/// Tunables for the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub max_concurrent_passes: usize,
    pub throttle: Duration,
    pub max_steps_per_pass: usize,
    pub drain_timeout: Duration,
    /// Retry delay for a timer pass that found the session lock taken.
    /// Failed timer passes back off from this, doubling up to `timer_backoff_max`.
    pub timer_retry: Duration,
    pub timer_backoff_max: Duration,
}

impl OrchestratorSettings {
    pub fn from_config(config: &ParleyConfig) -> Self {
        Self {
            max_concurrent_passes: config.agent.max_concurrent_passes,
            throttle: Duration::from_secs(config.flow.throttle_secs),
            max_steps_per_pass: config.flow.max_steps_per_pass,
            drain_timeout: Duration::from_secs(30),
            timer_retry: config.lock.wait_timeout(),
            timer_backoff_max: Duration::from_secs(300),
        }
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from_config(&ParleyConfig::default())
    }
}

/// The adapters a pass talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn ConversationStore>,
    pub lock: Arc<dyn DistributedLock>,
    pub delivery: Arc<dyn DeliveryGateway>,
    pub prompts: Arc<dyn PromptExecutor>,
}

/// How a single pass ended, from the orchestrator's point of view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassResult {
    /// Another pass holds the session lock; nothing was touched.
    LockRejected,
    /// An operator command was handled.
    Command,
    /// Operator echo that is not a command.
    Ignored,
    /// Automation is suppressed for this conversation.
    HumanOverride,
    /// Dropped by the reply throttle.
    Throttled,
    /// The device has no flow, or its flow does not parse.
    NoFlow,
    /// A timer fired for a conversation that is no longer waiting on it.
    Stale,
    /// The flow machine ran.
    Ran { outcome: &'static str, dispatched: usize },
    /// The pass failed before or after the flow ran (storage, panic).
    Error(String),
}

impl PassResult {
    pub fn label(&self) -> &'static str {
        match self {
            PassResult::LockRejected => "lock_rejected",
            PassResult::Command => "command",
            PassResult::Ignored => "ignored",
            PassResult::HumanOverride => "human_override",
            PassResult::Throttled => "throttled",
            PassResult::NoFlow => "no_flow",
            PassResult::Stale => "stale_timer",
            PassResult::Ran { outcome, .. } => *outcome,
            PassResult::Error(_) => "error",
        }
    }
}

enum Trigger {
    Message(InboundMessage),
    Timer,
}

pub struct Orchestrator {
    store: Arc<dyn ConversationStore>,
    lock: Arc<dyn DistributedLock>,
    delivery: Arc<dyn DeliveryGateway>,
    engine: FlowEngine,
    throttle: Throttle,
    commands: CommandParser,
    scheduler: DelayScheduler,
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    active: AtomicUsize,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    pub fn new(
        settings: OrchestratorSettings,
        collaborators: Collaborators,
        commands: CommandParser,
    ) -> Arc<Self> {
        let engine = FlowEngine::new(
            Arc::clone(&collaborators.delivery),
            collaborators.prompts,
            settings.max_steps_per_pass,
        );
        Arc::new(Self {
            store: collaborators.store,
            lock: collaborators.lock,
            delivery: collaborators.delivery,
            engine,
            throttle: Throttle::new(settings.throttle),
            commands,
            scheduler: DelayScheduler::new(),
            permits: Arc::new(Semaphore::new(settings.max_concurrent_passes.max(1))),
            tracker: TaskTracker::new(),
            active: AtomicUsize::new(0),
            settings,
        })
    }

    pub fn scheduler(&self) -> &DelayScheduler {
        &self.scheduler
    }

    /// Consumes the inbound queue until `cancel` fires, then drains.
    pub async fn run(self: Arc<Self>, mut inbound: mpsc::Receiver<InboundMessage>, cancel: CancellationToken) {
        info!(
            max_concurrent_passes = self.settings.max_concurrent_passes,
            "orchestrator running"
        );

        loop {
            let msg = tokio::select! {
                msg = inbound.recv() => match msg {
                    Some(msg) => msg,
                    None => break,
                },
                _ = cancel.cancelled() => {
                    info!("shutdown signal received, stopping orchestrator");
                    break;
                }
            };

            let permit = tokio::select! {
                permit = Arc::clone(&self.permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
                _ = cancel.cancelled() => break,
            };

            let this = Arc::clone(&self);
            self.tracker.spawn(async move {
                let _permit = permit;
                this.handle_inbound(msg).await;
            });
        }

        self.scheduler.shutdown();
        shutdown::drain_passes(&self.tracker, self.settings.drain_timeout).await;
        info!("orchestrator stopped");
    }

    /// Reschedules every persisted delay deadline. Returns how many.
    pub async fn reschedule_pending(self: &Arc<Self>) -> Result<usize, ParleyError> {
        let pending = self.store.pending_delays().await?;
        let count = pending.len();
        for (key, until) in pending {
            self.schedule_timer(key, until);
        }
        if count > 0 {
            info!(count, "rescheduled pending delay timers");
        }
        Ok(count)
    }

    fn schedule_timer(self: &Arc<Self>, key: ConversationKey, until: DateTime<Utc>) {
        self.schedule_timer_attempt(key, until, 0);
    }

    fn schedule_timer_attempt(self: &Arc<Self>, key: ConversationKey, until: DateTime<Utc>, failures: u32) {
        let this = Arc::clone(self);
        self.scheduler.schedule(key, until, move |key| async move {
            let tracker = this.tracker.clone();
            tracker.spawn(async move {
                this.timer_pass(key, failures).await;
            });
        });
    }

    /// Runs one pass for an inbound message.
    pub async fn handle_inbound(self: &Arc<Self>, msg: InboundMessage) -> PassResult {
        let key = msg.key();
        self.guarded(key, Trigger::Message(msg)).await
    }

    /// Runs one timer pass for a conversation parked on a `delay` node.
    ///
    /// A pass that finds the lock taken, or fails, is retried so the
    /// conversation never stays parked until the next restart.
    pub async fn handle_timer(self: &Arc<Self>, key: ConversationKey) -> PassResult {
        self.timer_pass(key, 0).await
    }

    async fn timer_pass(self: &Arc<Self>, key: ConversationKey, failures: u32) -> PassResult {
        let result = self.guarded(key.clone(), Trigger::Timer).await;
        let (retry_in, failures) = match &result {
            PassResult::LockRejected => {
                debug!(conversation = %key, "timer pass found lock held, retrying");
                (self.settings.timer_retry, failures)
            }
            PassResult::Error(e) => {
                let delay = self.timer_backoff(failures);
                warn!(conversation = %key, error = %e, retry_in_ms = delay.as_millis() as u64, "timer pass failed, retrying");
                (delay, failures.saturating_add(1))
            }
            _ => return result,
        };
        let retry = chrono::Duration::from_std(retry_in).unwrap_or_else(|_| chrono::Duration::seconds(1));
        self.schedule_timer_attempt(key, Utc::now() + retry, failures);
        result
    }

    fn timer_backoff(&self, failures: u32) -> Duration {
        let base = self.settings.timer_retry.max(Duration::from_millis(1));
        base.saturating_mul(2u32.saturating_pow(failures.min(16)))
            .min(self.settings.timer_backoff_max)
    }

    /// Lock, run, always release.
    async fn guarded(self: &Arc<Self>, key: ConversationKey, trigger: Trigger) -> PassResult {
        let token = match self.lock.try_acquire(&key).await {
            Ok(LockOutcome::Acquired(token)) => token,
            Ok(LockOutcome::Rejected) => {
                debug!(phone = %key.phone_number, device_id = %key.device_id, "session busy, dropping duplicate pass");
                parley_prometheus::record_lock_rejection();
                return PassResult::LockRejected;
            }
            Err(e) => {
                error!(phone = %key.phone_number, device_id = %key.device_id, error = %e, "session lock unavailable");
                parley_prometheus::record_pass("error");
                return PassResult::Error(e.to_string());
            }
        };

        let active = self.active.fetch_add(1, Ordering::Relaxed) + 1;
        parley_prometheus::set_active_passes(active as f64);

        let result = match AssertUnwindSafe(self.locked_pass(&key, trigger)).catch_unwind().await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                error!(phone = %key.phone_number, device_id = %key.device_id, error = %e, "pass failed");
                PassResult::Error(e.to_string())
            }
            Err(_) => {
                error!(phone = %key.phone_number, device_id = %key.device_id, "pass panicked");
                PassResult::Error("pass panicked".into())
            }
        };

        if let Err(e) = self.lock.release(&key, token).await {
            // The row ages out after the staleness window.
            error!(phone = %key.phone_number, device_id = %key.device_id, error = %e, "failed to release session lock");
        }

        let active = self.active.fetch_sub(1, Ordering::Relaxed).saturating_sub(1);
        parley_prometheus::set_active_passes(active as f64);
        parley_prometheus::record_pass(result.label());
        result
    }

    async fn locked_pass(
        self: &Arc<Self>,
        key: &ConversationKey,
        trigger: Trigger,
    ) -> Result<PassResult, ParleyError> {
        let now = Utc::now();
        match trigger {
            Trigger::Message(msg) => {
                let mut conv = self.load_or_create(key, &msg).await?;

                if msg.from_operator {
                    return self.handle_operator(&mut conv, &msg).await;
                }
                if conv.human_override {
                    debug!(phone = %key.phone_number, device_id = %key.device_id, "human override active, skipping flow");
                    return Ok(PassResult::HumanOverride);
                }
                if let ThrottleDecision::Drop { elapsed } =
                    self.throttle.check(conv.last_ai_call_at, now)
                {
                    debug!(
                        phone = %key.phone_number,
                        device_id = %key.device_id,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "throttled, dropping message"
                    );
                    parley_prometheus::record_throttled();
                    return Ok(PassResult::Throttled);
                }

                if msg.sender_name.is_some() {
                    conv.sender_name = msg.sender_name.clone();
                }
                self.run_flow(&mut conv, PassInput::Message(msg.input_text()), now).await
            }
            Trigger::Timer => {
                let Some(mut conv) = self.store.get_conversation(key).await? else {
                    return Ok(PassResult::Stale);
                };
                if conv.human_override || !conv.delay_until.is_some_and(|t| t <= now) {
                    debug!(conversation = %key, "timer no longer applies");
                    return Ok(PassResult::Stale);
                }
                self.run_flow(&mut conv, PassInput::Timer, now).await
            }
        }
    }

    async fn load_or_create(
        &self,
        key: &ConversationKey,
        msg: &InboundMessage,
    ) -> Result<Conversation, ParleyError> {
        if let Some(conv) = self.store.get_conversation(key).await? {
            return Ok(conv);
        }
        let mut conv = Conversation::new(key.clone());
        conv.sender_name = msg.sender_name.clone();
        self.store.create_conversation(&conv).await?;
        info!(phone = %key.phone_number, device_id = %key.device_id, "new conversation");
        Ok(conv)
    }

    async fn handle_operator(
        &self,
        conv: &mut Conversation,
        msg: &InboundMessage,
    ) -> Result<PassResult, ParleyError> {
        let key = conv.key.clone();
        let Some(command) = self.commands.parse(msg.input_text()) else {
            return Ok(PassResult::Ignored);
        };

        match command {
            OperatorCommand::DisableAutomation => {
                self.store.set_human_override(&key, true).await?;
                info!(phone = %key.phone_number, device_id = %key.device_id, "automation disabled by operator");
            }
            OperatorCommand::EnableAutomation => {
                self.store.set_human_override(&key, false).await?;
                info!(phone = %key.phone_number, device_id = %key.device_id, "automation enabled by operator");
            }
            OperatorCommand::Relay { route, text } => {
                if !conv.human_override {
                    debug!(phone = %key.phone_number, "relay ignored while automation is active");
                    return Ok(PassResult::Ignored);
                }
                let outbound = OutboundMessage::text(&key, text.clone()).via(route);
                match self.delivery.send(outbound).await {
                    Ok(receipt) if receipt.delivered => {
                        conv.record_bot_output(&text);
                        self.store.save_conversation(conv).await?;
                        parley_prometheus::record_dispatch("text");
                        debug!(phone = %key.phone_number, route = %route, "operator message relayed");
                    }
                    Ok(_) => warn!(phone = %key.phone_number, route = %route, "relay not accepted by provider"),
                    Err(e) => warn!(phone = %key.phone_number, route = %route, error = %e, "relay failed"),
                }
            }
        }
        Ok(PassResult::Command)
    }

    async fn load_flow(&self, device_id: &str) -> Result<Option<FlowDefinition>, ParleyError> {
        let Some(json) = self.store.load_flow(device_id).await? else {
            debug!(device_id, "no flow configured for device");
            return Ok(None);
        };
        match FlowDefinition::load(&json) {
            Ok(flow) => Ok(Some(flow)),
            Err(e) => {
                error!(device_id, error = %e, "stored flow is invalid");
                Ok(None)
            }
        }
    }

    async fn run_flow(
        self: &Arc<Self>,
        conv: &mut Conversation,
        input: PassInput<'_>,
        now: DateTime<Utc>,
    ) -> Result<PassResult, ParleyError> {
        let Some(flow) = self.load_flow(&conv.key.device_id).await? else {
            return Ok(PassResult::NoFlow);
        };

        let report = self.engine.run_pass(&flow, conv, input, now).await;
        if report.replied() {
            conv.last_ai_call_at = Some(now);
        }

        let key = &conv.key;
        match &report.outcome {
            PassOutcome::Aborted { node_id, error } => warn!(
                phone = %key.phone_number,
                device_id = %key.device_id,
                node_id = %node_id,
                error = %error,
                "pass aborted, position kept"
            ),
            PassOutcome::Failed { node_id, error } => warn!(
                phone = %key.phone_number,
                device_id = %key.device_id,
                node_id = node_id.as_deref().unwrap_or("-"),
                error = %error,
                "pass failed"
            ),
            outcome => debug!(
                phone = %key.phone_number,
                device_id = %key.device_id,
                outcome = outcome.label(),
                steps = report.steps,
                dispatched = report.dispatched,
                stage = conv.stage.as_deref().unwrap_or(""),
                "pass finished"
            ),
        }

        self.store.save_conversation(conv).await?;

        if let PassOutcome::Delayed { until, .. } = &report.outcome {
            self.schedule_timer(conv.key.clone(), *until);
        }

        Ok(PassResult::Ran {
            outcome: report.outcome.label(),
            dispatched: report.dispatched,
        })
    }
}
