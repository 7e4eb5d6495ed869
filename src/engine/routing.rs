// src/engine/routing.rs

//! Auto-approval routing contract.
//!
//! A [`RoutingPolicy`] is consulted once each time a task that requires
//! approval is completed. An [`Channel::Automatic`] decision completes the
//! task right away under the system identity; [`Channel::Human`] sends it
//! into review as usual. A policy error is logged and treated as `Human`.

use std::fmt::Debug;

/// Domain string passed to [`RoutingPolicy::evaluate`] for task events.
pub const TASK_DOMAIN: &str = "task";

/// Event kind passed for "complete with approval required".
pub const COMPLETE_EVENT: &str = "complete";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Human,
    Automatic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingDecision {
    pub channel: Channel,
    pub rule_id: Option<String>,
    pub reason: String,
}

impl RoutingDecision {
    pub fn human(reason: impl Into<String>) -> Self {
        Self {
            channel: Channel::Human,
            rule_id: None,
            reason: reason.into(),
        }
    }
}

pub trait RoutingPolicy: Send + Sync + Debug {
    fn evaluate(
        &self,
        domain: &str,
        event_kind: &str,
        context: &serde_json::Value,
    ) -> anyhow::Result<RoutingDecision>;
}
