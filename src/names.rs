//! Topic-name codec for the two RPC wire conventions.
//!
//! ROS2 mangles service topics as `rq/{name}Request` / `rr/{name}Reply` and
//! plain topics as `rt/{name}`; the DDS convention uses no prefix and the
//! `_Request` / `_Reply` suffixes. Action sub-services append `send_goal`,
//! `get_result` or `cancel_goal` to the action name before the outer shell,
//! and the feedback/status streams live on plain `rt/` topics.
//!
//! Classification is total: a name that matches nothing yields
//! [`RpcRole::None`], never an error.

use crate::{
  error::{EnablerError, EnablerResult},
  rpc::{ActionSubtopic, Protocol, RpcRole, ServiceSide},
};

// Topic mangling
pub const ROS2_TOPIC_PREFIX: &str = "rt/";
pub const DDS_TOPIC_PREFIX: &str = "";

// Service mangling
pub const ROS2_REQUEST_PREFIX: &str = "rq/";
pub const ROS2_REQUEST_SUFFIX: &str = "Request";
pub const ROS2_REPLY_PREFIX: &str = "rr/";
pub const ROS2_REPLY_SUFFIX: &str = "Reply";

pub const DDS_REQUEST_PREFIX: &str = "";
pub const DDS_REQUEST_SUFFIX: &str = "_Request";
pub const DDS_REPLY_PREFIX: &str = "";
pub const DDS_REPLY_SUFFIX: &str = "_Reply";

// Action mangling
pub const ACTION_GOAL_SUFFIX: &str = "send_goal";
pub const ACTION_RESULT_SUFFIX: &str = "get_result";
pub const ACTION_CANCEL_SUFFIX: &str = "cancel_goal";
pub const ACTION_FEEDBACK_SUFFIX: &str = "feedback";
pub const ACTION_STATUS_SUFFIX: &str = "status";

/// Prefix/suffix tuple of one wire convention.
struct NameTable {
  topic_prefix: &'static str,
  request_prefix: &'static str,
  request_suffix: &'static str,
  reply_prefix: &'static str,
  reply_suffix: &'static str,
}

const ROS2_TABLE: NameTable = NameTable {
  topic_prefix: ROS2_TOPIC_PREFIX,
  request_prefix: ROS2_REQUEST_PREFIX,
  request_suffix: ROS2_REQUEST_SUFFIX,
  reply_prefix: ROS2_REPLY_PREFIX,
  reply_suffix: ROS2_REPLY_SUFFIX,
};

const DDS_TABLE: NameTable = NameTable {
  topic_prefix: DDS_TOPIC_PREFIX,
  request_prefix: DDS_REQUEST_PREFIX,
  request_suffix: DDS_REQUEST_SUFFIX,
  reply_prefix: DDS_REPLY_PREFIX,
  reply_suffix: DDS_REPLY_SUFFIX,
};

fn name_table(protocol: Protocol) -> Option<&'static NameTable> {
  match protocol {
    Protocol::Ros2 => Some(&ROS2_TABLE),
    Protocol::Dds => Some(&DDS_TABLE),
    Protocol::Unknown => None,
  }
}

/// Classifier output: what a topic name tells about its RPC mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcInfo {
  pub topic: String,
  pub protocol: Protocol,
  pub service_name: Option<String>,
  pub action_name: Option<String>,
  pub role: RpcRole,
}

impl RpcInfo {
  /// Classify a topic name. Total and deterministic.
  pub fn classify(topic_name: &str) -> RpcInfo {
    // The ROS2 prefixes are recognisable from the name alone; everything
    // else falls through to the (empty-prefixed) DDS convention.
    let ros2_prefixed = topic_name.starts_with(ROS2_TOPIC_PREFIX)
      || topic_name.starts_with(ROS2_REQUEST_PREFIX)
      || topic_name.starts_with(ROS2_REPLY_PREFIX);
    let (protocol, table) = if ros2_prefixed {
      (Protocol::Ros2, &ROS2_TABLE)
    } else {
      (Protocol::Dds, &DDS_TABLE)
    };

    let mut info = RpcInfo {
      topic: topic_name.to_string(),
      protocol,
      service_name: None,
      action_name: None,
      role: RpcRole::None,
    };

    // Request-shaped, then reply-shaped.
    for (prefix, suffix, side) in [
      (table.request_prefix, table.request_suffix, ServiceSide::Request),
      (table.reply_prefix, table.reply_suffix, ServiceSide::Reply),
    ] {
      if let Some(stem) = strip_shell(topic_name, prefix, suffix) {
        if stem.is_empty() {
          continue;
        }
        info.service_name = Some(stem.to_string());
        info.role = match strip_action_suffix(stem) {
          Some((action_name, subtopic)) => {
            info.action_name = Some(action_name.to_string());
            RpcRole::Action { subtopic, side }
          }
          None => RpcRole::Service { side },
        };
        return info;
      }
    }

    // Feedback/status topics exist only under the ROS2 convention.
    if protocol == Protocol::Ros2 {
      if let Some(base) = topic_name.strip_prefix(table.topic_prefix) {
        for (suffix, role) in [
          (ACTION_FEEDBACK_SUFFIX, RpcRole::ActionFeedback),
          (ACTION_STATUS_SUFFIX, RpcRole::ActionStatus),
        ] {
          if base.len() > suffix.len() && base.ends_with(suffix) {
            let action_name = &base[..base.len() - suffix.len()];
            if action_name.ends_with('/') {
              info.action_name = Some(action_name.to_string());
              info.role = role;
              return info;
            }
          }
        }
      }
    }

    // No RPC shape. Without a ROS2 prefix we cannot even tell the
    // convention the topic was named under.
    if !ros2_prefixed {
      info.protocol = Protocol::Unknown;
    }
    info
  }

  pub fn is_rpc(&self) -> bool {
    self.role != RpcRole::None
  }
}

fn strip_shell<'a>(name: &'a str, prefix: &str, suffix: &str) -> Option<&'a str> {
  name.strip_prefix(prefix)?.strip_suffix(suffix)
}

/// Split `{action}{send_goal|get_result|cancel_goal}` stems. Stems that are
/// an action suffix alone have no action name and stay services.
fn strip_action_suffix(stem: &str) -> Option<(&str, ActionSubtopic)> {
  for (suffix, subtopic) in [
    (ACTION_GOAL_SUFFIX, ActionSubtopic::Goal),
    (ACTION_RESULT_SUFFIX, ActionSubtopic::Result),
    (ACTION_CANCEL_SUFFIX, ActionSubtopic::Cancel),
  ] {
    if let Some(action_name) = stem.strip_suffix(suffix) {
      if !action_name.is_empty() {
        return Some((action_name, subtopic));
      }
    }
  }
  None
}

/// Compose the topic name of one side of a plain service.
pub fn service_topic(
  service_name: &str,
  side: ServiceSide,
  protocol: Protocol,
) -> EnablerResult<String> {
  let table =
    name_table(protocol).ok_or(EnablerError::UnsupportedProtocol(protocol))?;
  Ok(match side {
    ServiceSide::Request => format!(
      "{}{}{}",
      table.request_prefix, service_name, table.request_suffix
    ),
    ServiceSide::Reply => format!(
      "{}{}{}",
      table.reply_prefix, service_name, table.reply_suffix
    ),
  })
}

/// Compose the topic name of one side of an action sub-service.
///
/// Only the ROS2 convention defines action topics.
pub fn action_service_topic(
  action_name: &str,
  subtopic: ActionSubtopic,
  side: ServiceSide,
  protocol: Protocol,
) -> EnablerResult<String> {
  if protocol != Protocol::Ros2 {
    return Err(EnablerError::UnsupportedProtocol(protocol));
  }
  let suffix = match subtopic {
    ActionSubtopic::Goal => ACTION_GOAL_SUFFIX,
    ActionSubtopic::Result => ACTION_RESULT_SUFFIX,
    ActionSubtopic::Cancel => ACTION_CANCEL_SUFFIX,
  };
  service_topic(&format!("{action_name}{suffix}"), side, protocol)
}

/// The service name an action sub-service appears under in discovery.
pub fn action_service_name(action_name: &str, subtopic: ActionSubtopic) -> String {
  let suffix = match subtopic {
    ActionSubtopic::Goal => ACTION_GOAL_SUFFIX,
    ActionSubtopic::Result => ACTION_RESULT_SUFFIX,
    ActionSubtopic::Cancel => ACTION_CANCEL_SUFFIX,
  };
  format!("{action_name}{suffix}")
}

pub fn action_feedback_topic(action_name: &str) -> String {
  format!("{ROS2_TOPIC_PREFIX}{action_name}{ACTION_FEEDBACK_SUFFIX}")
}

pub fn action_status_topic(action_name: &str) -> String {
  format!("{ROS2_TOPIC_PREFIX}{action_name}{ACTION_STATUS_SUFFIX}")
}

#[cfg(test)]
mod tests {
  use test_case::test_case;

  use super::*;

  #[test_case("rq/add_two_intsRequest", Protocol::Ros2, ServiceSide::Request, "add_two_ints" ; "ros2 request")]
  #[test_case("rr/add_two_intsReply", Protocol::Ros2, ServiceSide::Reply, "add_two_ints" ; "ros2 reply")]
  #[test_case("calculator_Request", Protocol::Dds, ServiceSide::Request, "calculator" ; "dds request")]
  #[test_case("calculator_Reply", Protocol::Dds, ServiceSide::Reply, "calculator" ; "dds reply")]
  fn classifies_plain_services(
    topic: &str,
    protocol: Protocol,
    side: ServiceSide,
    service_name: &str,
  ) {
    let info = RpcInfo::classify(topic);
    assert_eq!(info.protocol, protocol);
    assert_eq!(info.role, RpcRole::Service { side });
    assert_eq!(info.service_name.as_deref(), Some(service_name));
    assert_eq!(info.action_name, None);
  }

  #[test_case("rq/foo/barsend_goalRequest", ActionSubtopic::Goal, ServiceSide::Request ; "goal request")]
  #[test_case("rr/foo/barsend_goalReply", ActionSubtopic::Goal, ServiceSide::Reply ; "goal reply")]
  #[test_case("rq/foo/barget_resultRequest", ActionSubtopic::Result, ServiceSide::Request ; "result request")]
  #[test_case("rr/foo/barget_resultReply", ActionSubtopic::Result, ServiceSide::Reply ; "result reply")]
  #[test_case("rq/foo/barcancel_goalRequest", ActionSubtopic::Cancel, ServiceSide::Request ; "cancel request")]
  #[test_case("rr/foo/barcancel_goalReply", ActionSubtopic::Cancel, ServiceSide::Reply ; "cancel reply")]
  fn classifies_action_services(topic: &str, subtopic: ActionSubtopic, side: ServiceSide) {
    let info = RpcInfo::classify(topic);
    assert_eq!(info.protocol, Protocol::Ros2);
    assert_eq!(info.role, RpcRole::Action { subtopic, side });
    assert_eq!(info.action_name.as_deref(), Some("foo/bar"));
    // the full stem remains the service name
    assert!(info.service_name.unwrap().starts_with("foo/bar"));
  }

  #[test]
  fn classifies_action_streams() {
    let fb = RpcInfo::classify("rt/turtle1/rotate_absolute/_action/feedback");
    assert_eq!(fb.role, RpcRole::ActionFeedback);
    assert_eq!(
      fb.action_name.as_deref(),
      Some("turtle1/rotate_absolute/_action/")
    );

    let st = RpcInfo::classify("rt/turtle1/rotate_absolute/_action/status");
    assert_eq!(st.role, RpcRole::ActionStatus);
    assert_eq!(
      st.action_name.as_deref(),
      Some("turtle1/rotate_absolute/_action/")
    );
  }

  #[test]
  fn dds_names_never_form_actions() {
    // No action convention exists for the DDS naming.
    let info = RpcInfo::classify("svc/feedback");
    assert_eq!(info.role, RpcRole::None);
    assert_eq!(info.protocol, Protocol::Unknown);

    // An action-suffixed DDS service stem is still a service.
    let info = RpcInfo::classify("robosend_goal_Request");
    assert_eq!(
      info.role,
      RpcRole::Action { subtopic: ActionSubtopic::Goal, side: ServiceSide::Request }
    );
    assert_eq!(info.protocol, Protocol::Dds);
  }

  #[test_case("rt/chatter", Protocol::Ros2 ; "plain ros2 topic")]
  #[test_case("rq/half_openRequest_not_really", Protocol::Ros2 ; "ros2 prefix without suffix")]
  #[test_case("chatter", Protocol::Unknown ; "bare topic")]
  #[test_case("rq/Request", Protocol::Ros2 ; "empty stem")]
  #[test_case("_Request", Protocol::Unknown ; "empty dds stem")]
  fn non_rpc_names_yield_none(topic: &str, protocol: Protocol) {
    let info = RpcInfo::classify(topic);
    assert_eq!(info.role, RpcRole::None);
    assert_eq!(info.protocol, protocol);
    assert_eq!(info.service_name, None);
    assert_eq!(info.action_name, None);
  }

  #[test]
  fn bare_action_suffix_is_a_service() {
    let info = RpcInfo::classify("rq/send_goalRequest");
    assert_eq!(
      info.role,
      RpcRole::Service { side: ServiceSide::Request }
    );
    assert_eq!(info.service_name.as_deref(), Some("send_goal"));
  }

  #[test_case("rq/foo/barsend_goalRequest" ; "ros2 action goal request")]
  #[test_case("rr/foo/barget_resultReply" ; "ros2 action result reply")]
  #[test_case("rq/add_two_intsRequest" ; "ros2 service request")]
  #[test_case("calculator_Reply" ; "dds service reply")]
  #[test_case("rt/foo/bar/_action/feedback" ; "feedback stream")]
  #[test_case("rt/foo/bar/_action/status" ; "status stream")]
  fn composition_inverts_classification(topic: &str) {
    let info = RpcInfo::classify(topic);
    assert_ne!(info.role, RpcRole::None);
    let recomposed = match info.role {
      RpcRole::Service { side } => {
        service_topic(info.service_name.as_deref().unwrap(), side, info.protocol).unwrap()
      }
      RpcRole::Action { subtopic, side } => action_service_topic(
        info.action_name.as_deref().unwrap(),
        subtopic,
        side,
        info.protocol,
      )
      .unwrap(),
      RpcRole::ActionFeedback => action_feedback_topic(info.action_name.as_deref().unwrap()),
      RpcRole::ActionStatus => action_status_topic(info.action_name.as_deref().unwrap()),
      RpcRole::None => unreachable!(),
    };
    assert_eq!(recomposed, topic);
  }

  #[test]
  fn action_composition_is_ros2_only() {
    assert!(matches!(
      action_service_topic("a/", ActionSubtopic::Goal, ServiceSide::Request, Protocol::Dds),
      Err(EnablerError::UnsupportedProtocol(Protocol::Dds))
    ));
    assert!(matches!(
      service_topic("a", ServiceSide::Request, Protocol::Unknown),
      Err(EnablerError::UnsupportedProtocol(Protocol::Unknown))
    ));
  }
}
