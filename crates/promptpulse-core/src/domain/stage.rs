//! Request lifecycle stages

use serde::{Deserialize, Serialize};

/// Coarse phase of a request's lifecycle
///
/// Stages only move forward: `Gateway -> Inference -> Judge -> Completed`,
/// with `Failed` reachable from any non-terminal stage. `Completed` and
/// `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestStage {
    /// Accepted by the gateway, not yet picked up by a worker
    Gateway,
    /// A worker is running target-model inference
    Inference,
    /// A worker is running the judge evaluation
    Judge,
    /// Judged and archived
    Completed,
    /// Gave up at some stage; `error_message` carries the cause
    Failed,
}

impl RequestStage {
    /// Whether this stage is terminal (no further transitions)
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestStage::Completed | RequestStage::Failed)
    }

    /// Whether a transition from `self` to `next` respects the stage machine
    pub fn can_transition_to(&self, next: RequestStage) -> bool {
        if self.is_terminal() {
            return false;
        }
        if next == RequestStage::Failed {
            return true;
        }
        matches!(
            (*self, next),
            (RequestStage::Gateway, RequestStage::Inference)
                | (RequestStage::Inference, RequestStage::Judge)
                | (RequestStage::Judge, RequestStage::Completed)
        )
    }

    /// Stage name as serialized on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStage::Gateway => "Gateway",
            RequestStage::Inference => "Inference",
            RequestStage::Judge => "Judge",
            RequestStage::Completed => "Completed",
            RequestStage::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for RequestStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Submission outcome reported to the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestStatus {
    /// The request was persisted and published for processing
    Accepted,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_stages() {
        assert!(RequestStage::Completed.is_terminal());
        assert!(RequestStage::Failed.is_terminal());
        assert!(!RequestStage::Gateway.is_terminal());
        assert!(!RequestStage::Inference.is_terminal());
        assert!(!RequestStage::Judge.is_terminal());
    }

    #[test]
    fn test_forward_transitions() {
        assert!(RequestStage::Gateway.can_transition_to(RequestStage::Inference));
        assert!(RequestStage::Inference.can_transition_to(RequestStage::Judge));
        assert!(RequestStage::Judge.can_transition_to(RequestStage::Completed));
    }

    #[test]
    fn test_no_backward_transitions() {
        assert!(!RequestStage::Judge.can_transition_to(RequestStage::Inference));
        assert!(!RequestStage::Inference.can_transition_to(RequestStage::Gateway));
        assert!(!RequestStage::Judge.can_transition_to(RequestStage::Gateway));
    }

    #[test]
    fn test_no_stage_skipping() {
        assert!(!RequestStage::Gateway.can_transition_to(RequestStage::Judge));
        assert!(!RequestStage::Gateway.can_transition_to(RequestStage::Completed));
        assert!(!RequestStage::Inference.can_transition_to(RequestStage::Completed));
    }

    #[test]
    fn test_failed_from_any_non_terminal() {
        assert!(RequestStage::Gateway.can_transition_to(RequestStage::Failed));
        assert!(RequestStage::Inference.can_transition_to(RequestStage::Failed));
        assert!(RequestStage::Judge.can_transition_to(RequestStage::Failed));
    }

    #[test]
    fn test_terminal_stages_are_frozen() {
        assert!(!RequestStage::Completed.can_transition_to(RequestStage::Failed));
        assert!(!RequestStage::Failed.can_transition_to(RequestStage::Completed));
        assert!(!RequestStage::Failed.can_transition_to(RequestStage::Failed));
    }

    #[test]
    fn test_stage_serialization() {
        let json = serde_json::to_string(&RequestStage::Inference).unwrap();
        assert_eq!(json, "\"Inference\"");

        let stage: RequestStage = serde_json::from_str("\"Completed\"").unwrap();
        assert_eq!(stage, RequestStage::Completed);
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&RequestStatus::Accepted).unwrap();
        assert_eq!(json, "\"Accepted\"");
    }
}
