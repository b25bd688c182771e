//! RPC vocabulary shared by the name codec, the discovery aggregator and the
//! coordination engine: wire protocols, topic roles, goal identities, and the
//! per-goal correlation record.

pub mod json;

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};
#[allow(unused_imports)]
use log::{debug, error, info, warn};

use crate::time::Time;

/// Wire-naming convention a topic belongs to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Protocol {
  Ros2,
  Dds,
  Unknown,
}

/// Which half of a request/reply pair a topic carries.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ServiceSide {
  Request,
  Reply,
}

/// The three service-shaped subtopics of an action.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ActionSubtopic {
  Goal,
  Result,
  Cancel,
}

/// RPC role of a topic, as determined by its name alone.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RpcRole {
  /// Regular pub/sub topic, no RPC mapping.
  None,
  Service {
    side: ServiceSide,
  },
  Action {
    subtopic: ActionSubtopic,
    side: ServiceSide,
  },
  ActionFeedback,
  ActionStatus,
}

impl RpcRole {
  pub fn is_service(&self) -> bool {
    matches!(self, RpcRole::Service { .. })
  }

  pub fn is_action(&self) -> bool {
    matches!(
      self,
      RpcRole::Action { .. } | RpcRole::ActionFeedback | RpcRole::ActionStatus
    )
  }

  /// The request/reply side, for the service-shaped roles.
  pub fn side(&self) -> Option<ServiceSide> {
    match self {
      RpcRole::Service { side } | RpcRole::Action { side, .. } => Some(*side),
      _ => None,
    }
  }
}

/// 16-byte identity of a single action invocation.
///
/// Serializes as `{"uuid": [ ..16 bytes.. ]}`, which is the shape the ROS2
/// action envelopes carry.
#[derive(
  Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct GoalId {
  pub uuid: [u8; 16],
}

impl GoalId {
  pub const ZERO: GoalId = GoalId { uuid: [0; 16] };

  pub fn new_random() -> GoalId {
    GoalId {
      uuid: *uuid::Uuid::new_v4().as_bytes(),
    }
  }

  pub fn is_zero(&self) -> bool {
    *self == GoalId::ZERO
  }
}

impl fmt::Display for GoalId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for (i, b) in self.uuid.iter().enumerate() {
      if i != 0 {
        write!(f, "-")?;
      }
      write!(f, "{b}")?;
    }
    Ok(())
  }
}

impl fmt::Debug for GoalId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "GoalId({self})")
  }
}

/// Status of a goal, as published on the action status topic and inside
/// get-result replies. Numeric values are wire-visible.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum StatusCode {
  Unknown = 0,
  Accepted = 1,
  Executing = 2,
  Canceling = 3,
  Succeeded = 4,
  Canceled = 5,
  Aborted = 6,
  Rejected = 7,
  Timeout = 8,
  Failed = 9,
  CancelRequestFailed = 10,
}

impl StatusCode {
  /// Terminal codes end the goal's status lifecycle.
  pub fn is_terminal(self) -> bool {
    matches!(
      self,
      StatusCode::Succeeded
        | StatusCode::Canceled
        | StatusCode::Aborted
        | StatusCode::Rejected
        | StatusCode::Timeout
        | StatusCode::Failed
    )
  }

  pub fn as_str(self) -> &'static str {
    match self {
      StatusCode::Unknown => "Unknown",
      StatusCode::Accepted => "Accepted",
      StatusCode::Executing => "Executing",
      StatusCode::Canceling => "Canceling",
      StatusCode::Succeeded => "Succeeded",
      StatusCode::Canceled => "Canceled",
      StatusCode::Aborted => "Aborted",
      StatusCode::Rejected => "Rejected",
      StatusCode::Timeout => "Timeout",
      StatusCode::Failed => "Failed",
      StatusCode::CancelRequestFailed => "CancelRequestFailed",
    }
  }
}

impl fmt::Display for StatusCode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Return code of a cancel-goal reply.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum CancelCode {
  None = 0,
  Rejected = 1,
  UnknownGoalId = 2,
  GoalTerminated = 3,
}

/// Why a correlation record is being erased.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ActionEraseReason {
  /// A terminal status was observed for the goal.
  FinalStatus,
  /// The result was delivered.
  Result,
  /// Remove unconditionally, e.g. goal rejected or send failure.
  Forced,
}

/// Correlation record of one live goal, keyed by [`GoalId`] in the handler.
///
/// The record is created by a goal request and removed once both the result
/// and a terminal status have been seen, or on forced erase.
#[derive(Debug, Clone)]
pub struct ActionRequestInfo {
  pub action_name: String,
  pub protocol: Protocol,
  pub goal_request_id: u64,
  pub result_request_id: u64,
  pub goal_accepted_stamp: Time,
  result: Option<String>,
  result_received: bool,
  final_status_received: bool,
}

impl ActionRequestInfo {
  pub fn new(action_name: &str, request_id: u64, protocol: Protocol) -> ActionRequestInfo {
    ActionRequestInfo {
      action_name: action_name.to_string(),
      protocol,
      goal_request_id: request_id,
      result_request_id: 0,
      goal_accepted_stamp: Time::now(),
      result: None,
      result_received: false,
      final_status_received: false,
    }
  }

  pub fn set_request(&mut self, request_id: u64, subtopic: ActionSubtopic) {
    match subtopic {
      ActionSubtopic::Goal => self.goal_request_id = request_id,
      ActionSubtopic::Result => self.result_request_id = request_id,
      ActionSubtopic::Cancel => {} // cancel requests are not correlated per goal
    }
  }

  pub fn request_id(&self, subtopic: ActionSubtopic) -> Option<u64> {
    match subtopic {
      ActionSubtopic::Goal => Some(self.goal_request_id),
      ActionSubtopic::Result => Some(self.result_request_id),
      ActionSubtopic::Cancel => None,
    }
  }

  /// Cache a result for later delivery. Fails if empty or already cached.
  pub fn set_result(&mut self, result: String) -> bool {
    if result.is_empty() || self.result.is_some() {
      return false;
    }
    self.result = Some(result);
    true
  }

  pub fn cached_result(&self) -> Option<&str> {
    self.result.as_deref()
  }

  /// Mark the erase reason; returns true when the record may be removed.
  pub fn erase(&mut self, reason: ActionEraseReason) -> bool {
    match reason {
      ActionEraseReason::FinalStatus => self.final_status_received = true,
      ActionEraseReason::Result => self.result_received = true,
      ActionEraseReason::Forced => {
        self.final_status_received = true;
        self.result_received = true;
      }
    }
    self.final_status_received && self.result_received
  }
}
