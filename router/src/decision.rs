//! Routing decisions as returned to callers.

use crate::classifier::ClassificationResult;
use crate::confidence::ConfidenceBreakdown;
use crate::detector::DomainAnalysis;
use crate::escalation::{EscalationPackage, Trigger};
use crate::registry::WorkerRef;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoutingAction {
    DirectAgentRouting,
    OrchestrationRouting,
    EscalateToOrganizer,
}

impl std::fmt::Display for RoutingAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DirectAgentRouting => write!(f, "DIRECT_AGENT_ROUTING"),
            Self::OrchestrationRouting => write!(f, "ORCHESTRATION_ROUTING"),
            Self::EscalateToOrganizer => write!(f, "ESCALATE_TO_ORGANIZER"),
        }
    }
}

impl std::str::FromStr for RoutingAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "DIRECT_AGENT_ROUTING" | "DIRECT" => Ok(Self::DirectAgentRouting),
            "ORCHESTRATION_ROUTING" | "ORCHESTRATION" => Ok(Self::OrchestrationRouting),
            "ESCALATE_TO_ORGANIZER" | "ESCALATE" => Ok(Self::EscalateToOrganizer),
            other => Err(format!("unknown routing action: {other}")),
        }
    }
}

/// Where the task goes. The variant always agrees with [`RoutingAction`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RoutingTarget {
    Worker { worker: WorkerRef },
    Orchestration {
        entry_point: String,
        domain_analysis: DomainAnalysis,
    },
    Escalation { package: Box<EscalationPackage> },
}

impl RoutingTarget {
    pub fn action(&self) -> RoutingAction {
        match self {
            Self::Worker { .. } => RoutingAction::DirectAgentRouting,
            Self::Orchestration { .. } => RoutingAction::OrchestrationRouting,
            Self::Escalation { .. } => RoutingAction::EscalateToOrganizer,
        }
    }

    /// Worker id or entry point, for logs and the CLI summary line.
    pub fn label(&self) -> &str {
        match self {
            Self::Worker { worker } => worker.as_str(),
            Self::Orchestration { entry_point, .. } => entry_point,
            Self::Escalation { .. } => "organizer",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub request_id: Uuid,
    pub action: RoutingAction,
    pub target: RoutingTarget,
    pub confidence: ConfidenceBreakdown,
    pub reason: String,
    #[serde(default)]
    pub triggers: Vec<Trigger>,
    pub escalation_score: f64,
    pub classification: ClassificationResult,
    pub domain_count: usize,
    pub similarity_key: String,
    pub cache_hit: bool,
    pub fallback: bool,
    pub elapsed_ms: u64,
    pub decided_at: DateTime<Utc>,
}

impl RoutingDecision {
    /// Same action and target, ignoring per-request fields.
    pub fn is_same_route(&self, other: &RoutingDecision) -> bool {
        self.action == other.action && self.target == other.target
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_serializes_with_wire_names() {
        let json = serde_json::to_string(&RoutingAction::EscalateToOrganizer).unwrap();
        assert_eq!(json, "\"ESCALATE_TO_ORGANIZER\"");
        let back: RoutingAction = serde_json::from_str("\"ORCHESTRATION_ROUTING\"").unwrap();
        assert_eq!(back, RoutingAction::OrchestrationRouting);
    }

    #[test]
    fn test_action_display_matches_serde() {
        for action in [
            RoutingAction::DirectAgentRouting,
            RoutingAction::OrchestrationRouting,
            RoutingAction::EscalateToOrganizer,
        ] {
            let json = serde_json::to_string(&action).unwrap();
            assert_eq!(json.trim_matches('"'), action.to_string());
        }
    }

    #[test]
    fn test_action_parse_accepts_short_forms() {
        assert_eq!("direct".parse::<RoutingAction>(), Ok(RoutingAction::DirectAgentRouting));
        assert_eq!(
            "escalate-to-organizer".parse::<RoutingAction>(),
            Ok(RoutingAction::EscalateToOrganizer)
        );
        assert!("nowhere".parse::<RoutingAction>().is_err());
    }

    #[test]
    fn test_target_action_agrees() {
        let target = RoutingTarget::Worker {
            worker: WorkerRef::new("debug-issue"),
        };
        assert_eq!(target.action(), RoutingAction::DirectAgentRouting);
        assert_eq!(target.label(), "debug-issue");
    }
}
