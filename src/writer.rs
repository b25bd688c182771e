//! Projection of internal events onto the application callbacks.
//!
//! The writer is stateless: every method renders its inputs and forwards
//! them to the matching callback, skipping silently when none is installed.

use serde_json::Value;
#[allow(unused_imports)]
use log::{debug, error, info, warn};

use std::sync::Arc;

use crate::{
  callbacks::CallbackSet,
  message::Message,
  rpc::{GoalId, StatusCode},
  topic::{RpcAction, RpcTopic, TopicDescription},
  types::{type_blob, DynamicType},
};

pub struct Writer {
  callbacks: Arc<CallbackSet>,
}

impl Writer {
  pub fn new(callbacks: Arc<CallbackSet>) -> Writer {
    Writer { callbacks }
  }

  /// Report a newly known type: IDL, serialized type + dependencies, and a
  /// data placeholder.
  pub fn write_schema(&self, dyn_type: &DynamicType) {
    let type_name = dyn_type.type_name();
    info!("Writing schema: {type_name}.");

    if let Some(cb) = &self.callbacks.dds.type_notification {
      let idl = dyn_type.idl();
      let blob = type_blob(dyn_type);
      let placeholder = serde_json::to_string_pretty(&dyn_type.placeholder_json())
        .unwrap_or_default();
      cb(type_name, &idl, &blob, &placeholder);
    }
  }

  pub fn write_topic(&self, topic: &TopicDescription) {
    info!("Writing topic: {}.", topic.name);

    if let Some(cb) = &self.callbacks.dds.topic_notification {
      cb(&topic.name, &topic.info());
    }
  }

  /// Decode a sample into plain JSON text. Failures are logged and yield
  /// `None`; the sample is then dropped by the caller.
  pub fn render_sample(&self, msg: &Message, dyn_type: &DynamicType) -> Option<String> {
    match dyn_type.deserialize_json(msg.payload.data()) {
      Ok(value) => Some(value.to_string()),
      Err(e) => {
        error!(
          "Not able to deserialize data of topic {} : {e}",
          msg.topic.name
        );
        None
      }
    }
  }

  /// Regular pub/sub sample: wrap into the data envelope and notify.
  pub fn write_data(&self, msg: &Message, dyn_type: &DynamicType) {
    info!("Writing message from topic: {}.", msg.topic.name);

    if self.callbacks.dds.data_notification.is_none() {
      return;
    }
    let dyn_data = match dyn_type.deserialize_json(msg.payload.data()) {
      Ok(value) => value,
      Err(e) => {
        error!(
          "Not able to deserialize data of topic {} : {e}",
          msg.topic.name
        );
        return;
      }
    };

    // Envelope: source id, fixed middleware tag, then the sample keyed by
    // topic name and instance handle.
    let mut data_map = serde_json::Map::new();
    data_map.insert(msg.instance_handle.clone(), dyn_data);

    let mut topic_entry = serde_json::Map::new();
    topic_entry.insert("type".to_string(), Value::String(msg.topic.type_name.clone()));
    topic_entry.insert("data".to_string(), Value::Object(data_map));

    let mut envelope = serde_json::Map::new();
    envelope.insert("id".to_string(), Value::String(msg.source_guid.to_string()));
    envelope.insert("type".to_string(), Value::String("fastdds".to_string()));
    envelope.insert(msg.topic.name.clone(), Value::Object(topic_entry));

    if let Some(cb) = &self.callbacks.dds.data_notification {
      cb(
        &msg.topic.name,
        &Value::Object(envelope).to_string(),
        msg.publish_time_nanos(),
      );
    }
  }

  pub fn write_service(&self, service: &RpcTopic) {
    if let Some(cb) = &self.callbacks.service.service_notification {
      cb(&service.name, &service.info());
    }
  }

  pub fn write_action(&self, action: &RpcAction) {
    if let Some(cb) = &self.callbacks.action.action_notification {
      cb(&action.name, &action.info());
    }
  }

  pub fn write_service_request(
    &self,
    service_name: &str,
    json: &str,
    request_id: u64,
    publish_time: i64,
  ) {
    if let Some(cb) = &self.callbacks.service.service_request_notification {
      cb(service_name, json, request_id, publish_time);
    }
  }

  pub fn write_service_reply(
    &self,
    service_name: &str,
    json: &str,
    request_id: u64,
    publish_time: i64,
  ) {
    if let Some(cb) = &self.callbacks.service.service_reply_notification {
      cb(service_name, json, request_id, publish_time);
    }
  }

  /// Goal request verdict from the application; `None` when no callback is
  /// installed, in which case no goal reply should be sent either.
  pub fn write_action_goal_request(
    &self,
    action_name: &str,
    json: &str,
    goal_id: &GoalId,
    publish_time: i64,
  ) -> Option<bool> {
    self
      .callbacks
      .action
      .action_goal_request_notification
      .as_ref()
      .map(|cb| cb(action_name, json, goal_id, publish_time))
  }

  pub fn write_action_cancel_request(
    &self,
    action_name: &str,
    goal_id: &GoalId,
    timestamp: i64,
    request_id: u64,
    publish_time: i64,
  ) {
    if let Some(cb) = &self.callbacks.action.action_cancel_request_notification {
      cb(action_name, goal_id, timestamp, request_id, publish_time);
    }
  }

  pub fn write_action_feedback(
    &self,
    action_name: &str,
    json: &str,
    goal_id: &GoalId,
    publish_time: i64,
  ) {
    if let Some(cb) = &self.callbacks.action.action_feedback_notification {
      cb(action_name, json, goal_id, publish_time);
    }
  }

  pub fn write_action_status(
    &self,
    action_name: &str,
    goal_id: &GoalId,
    status_code: StatusCode,
    publish_time: i64,
  ) {
    if let Some(cb) = &self.callbacks.action.action_status_notification {
      cb(
        action_name,
        goal_id,
        status_code,
        status_code.as_str(),
        publish_time,
      );
    }
  }

  pub fn write_action_result(
    &self,
    action_name: &str,
    json: &str,
    goal_id: &GoalId,
    publish_time: i64,
  ) {
    if let Some(cb) = &self.callbacks.action.action_result_notification {
      cb(action_name, json, goal_id, publish_time);
    }
  }
}
