//! Application callback tables.
//!
//! All callbacks are optional; a dispatch site finding no callback installed
//! skips the notification silently. Queries return `None` when the
//! application cannot answer.

use bytes::Bytes;

use crate::{
  rpc::{GoalId, StatusCode},
  topic::{ActionInfo, ServiceInfo, TopicInfo},
};

/// Log sink: (file, line, function or module path, category, message).
pub type LogCallback = Box<dyn Fn(&str, u32, &str, &str, &str) + Send + Sync>;

/// Type reception: (type name, IDL text, serialized type + dependencies,
/// data placeholder JSON).
pub type TypeNotification = Box<dyn Fn(&str, &str, &[u8], &str) + Send + Sync>;

/// Topic reception: (topic name, type and QoS).
pub type TopicNotification = Box<dyn Fn(&str, &TopicInfo) + Send + Sync>;

/// Data reception: (topic name, JSON envelope, publish time in nanoseconds).
pub type DataNotification = Box<dyn Fn(&str, &str, i64) + Send + Sync>;

/// Request for a serialized type description by name.
pub type TypeQuery = Box<dyn Fn(&str) -> Option<Bytes> + Send + Sync>;

/// Request for the type and QoS of a topic by name.
pub type TopicQuery = Box<dyn Fn(&str) -> Option<TopicInfo> + Send + Sync>;

/// Service discovery: (service name, request and reply topic infos).
pub type ServiceNotification = Box<dyn Fn(&str, &ServiceInfo) + Send + Sync>;

/// Inbound service request: (service name, JSON, request id, publish time).
/// The request id identifies the reply to send later.
pub type ServiceRequestNotification = Box<dyn Fn(&str, &str, u64, i64) + Send + Sync>;

/// Inbound service reply: (service name, JSON, request id, publish time).
pub type ServiceReplyNotification = Box<dyn Fn(&str, &str, u64, i64) + Send + Sync>;

/// Request for the request/reply types of a service by name.
pub type ServiceQuery = Box<dyn Fn(&str) -> Option<ServiceInfo> + Send + Sync>;

/// Action discovery: (action name, full topic set).
pub type ActionNotification = Box<dyn Fn(&str, &ActionInfo) + Send + Sync>;

/// Inbound goal request: (action name, JSON, goal id, publish time).
/// Returns whether the goal is accepted.
pub type ActionGoalRequestNotification =
  Box<dyn Fn(&str, &str, &GoalId, i64) -> bool + Send + Sync>;

/// Inbound cancel request: (action name, goal id, cancel timestamp in
/// nanoseconds, request id, publish time). A zero goal id and/or timestamp
/// widen the cancellation per the ROS2 policy.
pub type ActionCancelRequestNotification =
  Box<dyn Fn(&str, &GoalId, i64, u64, i64) + Send + Sync>;

/// Inbound feedback: (action name, JSON, goal id, publish time).
pub type ActionFeedbackNotification = Box<dyn Fn(&str, &str, &GoalId, i64) + Send + Sync>;

/// Inbound status update: (action name, goal id, status code, status text,
/// publish time).
pub type ActionStatusNotification =
  Box<dyn Fn(&str, &GoalId, StatusCode, &str, i64) + Send + Sync>;

/// Inbound result: (action name, JSON, goal id, publish time).
pub type ActionResultNotification = Box<dyn Fn(&str, &str, &GoalId, i64) + Send + Sync>;

/// Request for the full topic set of an action by name.
pub type ActionQuery = Box<dyn Fn(&str) -> Option<ActionInfo> + Send + Sync>;

#[derive(Default)]
pub struct DdsCallbacks {
  pub type_notification: Option<TypeNotification>,
  pub topic_notification: Option<TopicNotification>,
  pub data_notification: Option<DataNotification>,
  pub type_query: Option<TypeQuery>,
  pub topic_query: Option<TopicQuery>,
}

#[derive(Default)]
pub struct ServiceCallbacks {
  pub service_notification: Option<ServiceNotification>,
  pub service_request_notification: Option<ServiceRequestNotification>,
  pub service_reply_notification: Option<ServiceReplyNotification>,
  pub service_query: Option<ServiceQuery>,
}

#[derive(Default)]
pub struct ActionCallbacks {
  pub action_notification: Option<ActionNotification>,
  pub action_goal_request_notification: Option<ActionGoalRequestNotification>,
  pub action_cancel_request_notification: Option<ActionCancelRequestNotification>,
  pub action_feedback_notification: Option<ActionFeedbackNotification>,
  pub action_status_notification: Option<ActionStatusNotification>,
  pub action_result_notification: Option<ActionResultNotification>,
  pub action_query: Option<ActionQuery>,
}

/// The complete callback table handed over at enabler construction.
#[derive(Default)]
pub struct CallbackSet {
  pub log: Option<LogCallback>,
  pub dds: DdsCallbacks,
  pub service: ServiceCallbacks,
  pub action: ActionCallbacks,
}
