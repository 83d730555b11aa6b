/// A context-tree node's lifecycle status (§3 "Context tree"). Transitions are monotonic
/// except that `Created`/`SubsRunning`/`SelfRunning`/`AwaitingResult` may jump to
/// `Cancelled` or `Error` at any time; once `Finished`, a node stays `Finished` (and, per the
/// same invariant, forces all of its descendants to `Finished` too).
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum NodeStatus {
  Created,
  SubsRunning,
  SelfRunning,
  AwaitingResult,
  Finished,
  Cancelled,
  Error,
}

impl NodeStatus {
  pub fn is_terminal(self) -> bool {
    matches!(self, NodeStatus::Finished | NodeStatus::Cancelled | NodeStatus::Error)
  }

  /// Whether `self -> next` is a legal transition under the monotonicity invariant.
  pub fn can_transition_to(self, next: NodeStatus) -> bool {
    if self == next {
      return true;
    }
    match self {
      NodeStatus::Finished | NodeStatus::Cancelled | NodeStatus::Error => false,
      NodeStatus::Created | NodeStatus::SubsRunning | NodeStatus::SelfRunning | NodeStatus::AwaitingResult => {
        matches!(
          next,
          NodeStatus::SubsRunning
            | NodeStatus::SelfRunning
            | NodeStatus::AwaitingResult
            | NodeStatus::Finished
            | NodeStatus::Cancelled
            | NodeStatus::Error
        )
      }
    }
  }
}
