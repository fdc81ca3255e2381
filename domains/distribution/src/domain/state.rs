//! State machine for distribution records
//!
//! A record moves Pending → Success, or Pending → Failed → Pending (retry)
//! → Success | Failed. Success is terminal: an automatic publish must never
//! overwrite a delivered record.

pub use newsrelay_common::StateError;

// ============================================================================
// Distribution State Machine
// ============================================================================

/// Distribution record states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DistributionState {
    Pending,
    Success,
    Failed,
}

impl DistributionState {
    /// Check if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Get all valid next states from current state
    pub fn valid_transitions(&self) -> &'static [DistributionState] {
        match self {
            Self::Pending => &[Self::Success, Self::Failed],
            Self::Failed => &[Self::Pending],
            Self::Success => &[],
        }
    }
}

impl std::fmt::Display for DistributionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Events that trigger distribution state transitions
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DistributionEvent {
    /// Destination accepted the item (HTTP 200/201)
    Delivered,
    /// Rewrite, identity lookup, delivery or cancellation failed
    Fail,
    /// A new publish picks up a failed record
    Retry,
}

impl std::fmt::Display for DistributionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Delivered => write!(f, "delivered"),
            Self::Fail => write!(f, "fail"),
            Self::Retry => write!(f, "retry"),
        }
    }
}

/// Distribution state machine
pub struct DistributionStateMachine;

impl DistributionStateMachine {
    /// Attempt a state transition
    pub fn transition(
        current: DistributionState,
        event: DistributionEvent,
    ) -> Result<DistributionState, StateError> {
        if current.is_terminal() {
            return Err(StateError::TerminalState(current.to_string()));
        }

        let next = match (&current, &event) {
            (DistributionState::Pending, DistributionEvent::Delivered) => {
                DistributionState::Success
            }
            (DistributionState::Pending, DistributionEvent::Fail) => DistributionState::Failed,
            (DistributionState::Failed, DistributionEvent::Retry) => DistributionState::Pending,
            _ => {
                return Err(StateError::InvalidTransition {
                    from: current.to_string(),
                    event: event.to_string(),
                });
            }
        };

        Ok(next)
    }

    /// Check if a transition is valid without performing it
    pub fn can_transition(current: DistributionState, event: &DistributionEvent) -> bool {
        Self::transition(current, *event).is_ok()
    }
}
