// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Flow graph model.
//!
//! Authored flows arrive as `{nodes: [{id, type, data}], edges: [{source,
//! target, condition?}]}`. Each node's `type` selects a [`NodeKind`] and its
//! `data` object is decoded into that variant's payload.

use std::collections::{HashMap, HashSet};

use parley_core::types::{MediaKind, PromptSpec};
use parley_core::ParleyError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::condition::{ConditionRule, RuleKind};

/// One node variant per authored node type.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Start,
    Message { text: String },
    Media { kind: MediaKind, url: String, caption: Option<String> },
    Delay { seconds: u64 },
    Condition { rules: Vec<ConditionRule> },
    Stage { stage: String },
    UserReply,
    WaitingReplyTimes,
    AiPrompt(PromptSpec),
    AdvancedAiPrompt(PromptSpec),
    Manual,
}

impl NodeKind {
    /// The authored `type` string.
    pub fn type_name(&self) -> &'static str {
        match self {
            NodeKind::Start => "start",
            NodeKind::Message { .. } => "message",
            NodeKind::Media { kind: MediaKind::Image, .. } => "image",
            NodeKind::Media { kind: MediaKind::Audio, .. } => "audio",
            NodeKind::Media { kind: MediaKind::Video, .. } => "video",
            NodeKind::Media { .. } => "media",
            NodeKind::Delay { .. } => "delay",
            NodeKind::Condition { .. } => "condition",
            NodeKind::Stage { .. } => "stage",
            NodeKind::UserReply => "user_reply",
            NodeKind::WaitingReplyTimes => "waiting_reply_times",
            NodeKind::AiPrompt(_) => "ai_prompt",
            NodeKind::AdvancedAiPrompt(_) => "advanced_ai_prompt",
            NodeKind::Manual => "manual",
        }
    }

    fn from_raw(node_type: &str, data: Value) -> Result<Self, String> {
        fn decode<T: serde::de::DeserializeOwned>(data: Value) -> Result<T, String> {
            serde_json::from_value(data).map_err(|e| e.to_string())
        }

        let kind = match node_type {
            "start" => NodeKind::Start,
            "message" => {
                let d: TextData = decode(data)?;
                NodeKind::Message { text: d.text }
            }
            "image" | "audio" | "video" => {
                let d: MediaData = decode(data)?;
                let kind = match node_type {
                    "image" => MediaKind::Image,
                    "audio" => MediaKind::Audio,
                    _ => MediaKind::Video,
                };
                NodeKind::Media {
                    kind,
                    url: d.url,
                    caption: d.caption.filter(|c| !c.is_empty()),
                }
            }
            "delay" => {
                let d: DelayData = decode(data)?;
                NodeKind::Delay { seconds: d.seconds }
            }
            "condition" => {
                let d: ConditionData = decode(data)?;
                NodeKind::Condition { rules: d.rules }
            }
            "stage" => {
                let d: StageData = decode(data)?;
                NodeKind::Stage { stage: d.stage }
            }
            "user_reply" => NodeKind::UserReply,
            "waiting_reply_times" => NodeKind::WaitingReplyTimes,
            "ai_prompt" => NodeKind::AiPrompt(decode(data)?),
            "advanced_ai_prompt" => NodeKind::AdvancedAiPrompt(decode(data)?),
            "manual" => NodeKind::Manual,
            other => return Err(format!("unknown node type `{other}`")),
        };
        Ok(kind)
    }
}

#[derive(Deserialize)]
struct TextData {
    #[serde(alias = "message")]
    text: String,
}

#[derive(Deserialize)]
struct MediaData {
    #[serde(alias = "mediaUrl", alias = "media_url")]
    url: String,
    #[serde(default)]
    caption: Option<String>,
}

#[derive(Deserialize)]
struct DelayData {
    #[serde(alias = "delay")]
    seconds: u64,
}

#[derive(Deserialize)]
struct ConditionData {
    #[serde(default)]
    rules: Vec<ConditionRule>,
}

#[derive(Deserialize)]
struct StageData {
    stage: String,
}

/// Node as it appears in authored JSON.
#[derive(Deserialize)]
struct RawNode {
    id: String,
    #[serde(rename = "type")]
    node_type: String,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: String,
    pub kind: NodeKind,
}

/// A directed edge. `condition` names the rule id that selects it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub source: String,
    pub target: String,
    #[serde(default, alias = "sourceHandle")]
    pub condition: Option<String>,
}

#[derive(Deserialize)]
struct RawFlow {
    nodes: Vec<RawNode>,
    #[serde(default)]
    edges: Vec<Edge>,
}

/// An immutable, indexed flow graph.
#[derive(Debug, Clone)]
pub struct FlowDefinition {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    index: HashMap<String, usize>,
}

impl FlowDefinition {
    /// Parses authored JSON. Structural rules are checked by [`validate`](Self::validate).
    pub fn from_json(json: &str) -> Result<Self, ParleyError> {
        let raw: RawFlow = serde_json::from_str(json).map_err(|e| ParleyError::Flow {
            message: format!("invalid flow JSON: {e}"),
        })?;

        let nodes = raw
            .nodes
            .into_iter()
            .map(|n| {
                NodeKind::from_raw(&n.node_type, n.data)
                    .map(|kind| Node { id: n.id.clone(), kind })
                    .map_err(|reason| ParleyError::Flow {
                        message: format!("node `{}`: {reason}", n.id),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self::new(nodes, raw.edges))
    }

    pub fn new(nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        let index = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.clone(), i))
            .collect();
        Self {
            nodes,
            edges,
            index,
        }
    }

    /// Parses and validates in one step.
    pub fn load(json: &str) -> Result<Self, ParleyError> {
        let flow = Self::from_json(json)?;
        flow.validate().map_err(|problems| ParleyError::Flow {
            message: problems.join("; "),
        })?;
        Ok(flow)
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    pub fn start_node(&self) -> Option<&Node> {
        self.nodes.iter().find(|n| n.kind == NodeKind::Start)
    }

    pub fn outgoing<'a, 'b>(&'a self, id: &'b str) -> impl Iterator<Item = &'a Edge> + use<'a, 'b> {
        self.edges.iter().filter(move |e| e.source == id)
    }

    /// Target of the node's unconditional successor (first outgoing edge).
    pub fn next_of(&self, id: &str) -> Option<&str> {
        self.outgoing(id).next().map(|e| e.target.as_str())
    }

    /// Target of the edge tagged with `rule_id` leaving `id`.
    pub fn next_for_rule(&self, id: &str, rule_id: &str) -> Option<&str> {
        self.outgoing(id)
            .find(|e| e.condition.as_deref() == Some(rule_id))
            .map(|e| e.target.as_str())
    }

    /// Checks structural rules, returning every violation found.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut problems = Vec::new();

        let starts = self
            .nodes
            .iter()
            .filter(|n| n.kind == NodeKind::Start)
            .count();
        if starts != 1 {
            problems.push(format!("expected exactly one start node, found {starts}"));
        }

        let mut seen = HashSet::new();
        for node in &self.nodes {
            if !seen.insert(node.id.as_str()) {
                problems.push(format!("duplicate node id `{}`", node.id));
            }
        }

        for edge in &self.edges {
            for (end, id) in [("source", &edge.source), ("target", &edge.target)] {
                if !self.index.contains_key(id) {
                    problems.push(format!(
                        "edge {} -> {}: {end} `{id}` does not exist",
                        edge.source, edge.target
                    ));
                }
            }
        }

        for node in &self.nodes {
            let NodeKind::Condition { rules } = &node.kind else {
                continue;
            };
            for rule in rules {
                let edges = self
                    .outgoing(&node.id)
                    .filter(|e| e.condition.as_deref() == Some(rule.id.as_str()))
                    .count();
                if rule.kind != RuleKind::Default && edges > 1 {
                    problems.push(format!(
                        "condition `{}`: rule `{}` has {edges} edges",
                        node.id, rule.id
                    ));
                }
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(problems)
        }
    }
}
