//! ROS2 action message envelopes and their JSON codecs.
//!
//! These are the wire shapes the ROS2 IDL generator would produce for the
//! action sub-services and topics, carried here as JSON text between the
//! application and the bus.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
  error::{EnablerError, EnablerResult},
  rpc::{CancelCode, GoalId, StatusCode},
  time::Time,
};

/// Goal sending/setting service
#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct SendGoalRequest {
  pub goal_id: GoalId,
  pub goal: Value,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct SendGoalResponse {
  pub accepted: bool,
  pub stamp: Time,
}

/// Result getting service
#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct GetResultRequest {
  pub goal_id: GoalId,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct GetResultResponse {
  pub status: StatusCode,
  pub result: Value,
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct GoalInfo {
  pub goal_id: GoalId,
  pub stamp: Time,
}

/// Cancellation service
#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct CancelGoalRequest {
  pub goal_info: GoalInfo,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct CancelGoalResponse {
  pub return_code: CancelCode,
  pub goals_canceling: Vec<GoalInfo>,
}

/// Feedback topic message
#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct FeedbackMessage {
  pub goal_id: GoalId,
  pub feedback: Value,
}

/// Status topic message
#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct GoalStatus {
  pub goal_info: GoalInfo,
  pub status: StatusCode,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct GoalStatusArray {
  pub status_list: Vec<GoalStatus>,
}

fn parse_user_json(json: &str) -> EnablerResult<Value> {
  serde_json::from_str(json).map_err(|e| EnablerError::SerializationFailed(e.to_string()))
}

fn dump<T: Serialize>(msg: &T) -> String {
  // Envelope structs serialize infallibly.
  serde_json::to_string(msg).unwrap_or_default()
}

/// Wrap a user goal into a send-goal request envelope.
pub fn goal_request_msg(goal_json: &str, goal_id: GoalId) -> EnablerResult<String> {
  let goal = parse_user_json(goal_json)?;
  Ok(dump(&SendGoalRequest { goal_id, goal }))
}

pub fn goal_reply_msg(accepted: bool) -> String {
  dump(&SendGoalResponse {
    accepted,
    stamp: Time::now(),
  })
}

/// Cancel request. A zero goal id and/or zero timestamp widen the request
/// per the ROS2 cancellation policy.
pub fn cancel_request_msg(goal_id: GoalId, timestamp_nanos: i64) -> String {
  dump(&CancelGoalRequest {
    goal_info: GoalInfo {
      goal_id,
      stamp: Time::from_nanos(timestamp_nanos),
    },
  })
}

pub fn cancel_reply_msg(canceling_goals: &[(GoalId, Time)], cancel_code: CancelCode) -> String {
  dump(&CancelGoalResponse {
    return_code: cancel_code,
    goals_canceling: canceling_goals
      .iter()
      .map(|(goal_id, stamp)| GoalInfo {
        goal_id: *goal_id,
        stamp: *stamp,
      })
      .collect(),
  })
}

pub fn result_request_msg(goal_id: GoalId) -> String {
  dump(&GetResultRequest { goal_id })
}

pub fn result_reply_msg(status_code: StatusCode, result_json: &str) -> EnablerResult<String> {
  let result = parse_user_json(result_json)?;
  Ok(dump(&GetResultResponse {
    status: status_code,
    result,
  }))
}

/// Status message carrying a single goal entry, stamped with the time the
/// goal was accepted.
pub fn status_msg(goal_id: GoalId, status_code: StatusCode, goal_accepted_stamp: Time) -> String {
  dump(&GoalStatusArray {
    status_list: vec![GoalStatus {
      goal_info: GoalInfo {
        goal_id,
        stamp: goal_accepted_stamp,
      },
      status: status_code,
    }],
  })
}

pub fn feedback_msg(feedback_json: &str, goal_id: GoalId) -> EnablerResult<String> {
  let feedback = parse_user_json(feedback_json)?;
  Ok(dump(&FeedbackMessage { goal_id, feedback }))
}

/// Extract the goal id from any request-shaped action envelope.
///
/// Send-goal and get-result requests carry it at `goal_id`, cancel requests
/// under `goal_info.goal_id`.
pub fn goal_id_from_request(json: &str) -> Option<GoalId> {
  let value: Value = serde_json::from_str(json).ok()?;
  let id_value = value
    .get("goal_id")
    .or_else(|| value.get("goal_info").and_then(|gi| gi.get("goal_id")))?;
  serde_json::from_value(id_value.clone()).ok()
}

/// Inner goal of a send-goal request envelope, as JSON text.
pub fn parse_goal_request_goal(json: &str) -> Option<String> {
  serde_json::from_str::<SendGoalRequest>(json)
    .ok()
    .map(|request| request.goal.to_string())
}

pub fn parse_goal_reply(json: &str) -> Option<SendGoalResponse> {
  serde_json::from_str(json).ok()
}

pub fn parse_cancel_request(json: &str) -> Option<CancelGoalRequest> {
  serde_json::from_str(json).ok()
}

pub fn parse_result_reply(json: &str) -> Option<GetResultResponse> {
  serde_json::from_str(json).ok()
}

pub fn parse_cancel_reply(json: &str) -> Option<CancelGoalResponse> {
  serde_json::from_str(json).ok()
}

pub fn parse_status_array(json: &str) -> Option<GoalStatusArray> {
  serde_json::from_str(json).ok()
}

pub fn parse_feedback(json: &str) -> Option<FeedbackMessage> {
  serde_json::from_str(json).ok()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn goal_request_wraps_user_goal() {
    let goal_id = GoalId::new_random();
    let msg = goal_request_msg("{\"order\": 5}", goal_id).unwrap();
    let parsed: SendGoalRequest = serde_json::from_str(&msg).unwrap();
    assert_eq!(parsed.goal_id, goal_id);
    assert_eq!(parsed.goal["order"], 5);
    assert_eq!(goal_id_from_request(&msg), Some(goal_id));
  }

  #[test]
  fn goal_request_rejects_malformed_goal() {
    assert!(goal_request_msg("not json", GoalId::ZERO).is_err());
  }

  #[test]
  fn cancel_request_carries_goal_info() {
    let goal_id = GoalId::new_random();
    let msg = cancel_request_msg(goal_id, 3_500_000_001);
    let parsed = parse_cancel_request(&msg).unwrap();
    assert_eq!(parsed.goal_info.goal_id, goal_id);
    assert_eq!(parsed.goal_info.stamp, Time { sec: 3, nanosec: 500_000_001 });
    // cancel requests expose the goal id through the generic extractor too
    assert_eq!(goal_id_from_request(&msg), Some(goal_id));
  }

  #[test]
  fn result_reply_round_trip() {
    let msg = result_reply_msg(StatusCode::Succeeded, "{\"sequence\":[0,1,1,2,3]}").unwrap();
    let parsed = parse_result_reply(&msg).unwrap();
    assert_eq!(parsed.status, StatusCode::Succeeded);
    assert_eq!(parsed.result["sequence"][4], 3);
  }

  #[test]
  fn status_codes_are_numeric_on_the_wire() {
    let msg = status_msg(GoalId::ZERO, StatusCode::Canceling, Time::ZERO);
    let value: Value = serde_json::from_str(&msg).unwrap();
    assert_eq!(value["status_list"][0]["status"], 3);
  }

  #[test]
  fn cancel_reply_lists_goals() {
    let a = GoalId::new_random();
    let b = GoalId::new_random();
    let msg = cancel_reply_msg(
      &[(a, Time { sec: 1, nanosec: 0 }), (b, Time { sec: 2, nanosec: 0 })],
      CancelCode::None,
    );
    let parsed: CancelGoalResponse = serde_json::from_str(&msg).unwrap();
    assert_eq!(parsed.return_code, CancelCode::None);
    assert_eq!(parsed.goals_canceling.len(), 2);
    assert_eq!(parsed.goals_canceling[0].goal_id, a);
  }

  #[test]
  fn feedback_round_trip() {
    let goal_id = GoalId::new_random();
    let msg = feedback_msg("{\"partial\":[0,1]}", goal_id).unwrap();
    let parsed = parse_feedback(&msg).unwrap();
    assert_eq!(parsed.goal_id, goal_id);
    assert_eq!(parsed.feedback["partial"][1], 1);
  }
}
