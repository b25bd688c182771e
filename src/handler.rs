//! Central coordination state of the enabler: the type registry, the
//! request-id source, and the goal correlation table, plus the dispatch of
//! inbound samples to the application callbacks.
//!
//! One mutex guards all mutable state. Effects are computed under the lock
//! and application callbacks are invoked only after it has been released, so
//! a callback may call back into the handler or the participant freely.

use std::{
  collections::BTreeMap,
  sync::{Arc, Mutex},
};

#[allow(unused_imports)]
use log::{debug, error, info, warn};

use crate::{
  callbacks::CallbackSet,
  error::{EnablerError, EnablerResult},
  message::Message,
  names::RpcInfo,
  payload::{Payload, PayloadData, PayloadPool},
  registry::{TypeObjectRegistry, TypeRegistry},
  rpc::{
    json, ActionEraseReason, ActionRequestInfo, ActionSubtopic, GoalId, Protocol, RpcRole,
    ServiceSide,
  },
  time::Time,
  topic::{RpcAction, RpcTopic, TopicDescription},
  types::{DynamicType, TypeIdentifier},
  writer::Writer,
};

/// Issue a get-result request for an accepted goal. Returns false when the
/// request could not be sent.
pub type SendActionGetResultRequest = Box<dyn Fn(&str, &GoalId) -> bool + Send + Sync>;

/// Send the goal reply carrying the application's verdict.
pub type SendActionSendGoalReply = Box<dyn Fn(&str, u64, bool) + Send + Sync>;

/// Deliver a result reply for the given request id.
pub type SendActionGetResultReply = Box<dyn Fn(&str, &GoalId, &str, u64) -> bool + Send + Sync>;

#[derive(Default)]
struct InternalCallbacks {
  send_action_get_result_request: Option<SendActionGetResultRequest>,
  send_action_send_goal_reply: Option<SendActionSendGoalReply>,
  send_action_get_result_reply: Option<SendActionGetResultReply>,
}

struct HandlerState {
  registry: TypeRegistry,
  unique_sequence_number: u64,
  requests_id: u64,
  action_requests: BTreeMap<GoalId, ActionRequestInfo>,
}

pub struct Handler {
  state: Mutex<HandlerState>,
  internal: Mutex<InternalCallbacks>,
  writer: Writer,
  callbacks: Arc<CallbackSet>,
  payload_pool: Arc<PayloadPool>,
}

impl Handler {
  pub fn new(
    payload_pool: Arc<PayloadPool>,
    callbacks: Arc<CallbackSet>,
    transport_registry: Option<Arc<dyn TypeObjectRegistry>>,
  ) -> Arc<Handler> {
    info!("Creating handler instance.");
    Arc::new(Handler {
      state: Mutex::new(HandlerState {
        registry: TypeRegistry::new(transport_registry),
        unique_sequence_number: 0,
        requests_id: 0,
        action_requests: BTreeMap::new(),
      }),
      internal: Mutex::new(InternalCallbacks::default()),
      writer: Writer::new(Arc::clone(&callbacks)),
      callbacks,
      payload_pool,
    })
  }

  pub fn set_send_action_get_result_request_callback(&self, cb: SendActionGetResultRequest) {
    self.internal.lock().unwrap().send_action_get_result_request = Some(cb);
  }

  pub fn set_send_action_send_goal_reply_callback(&self, cb: SendActionSendGoalReply) {
    self.internal.lock().unwrap().send_action_send_goal_reply = Some(cb);
  }

  pub fn set_send_action_get_result_reply_callback(&self, cb: SendActionGetResultReply) {
    self.internal.lock().unwrap().send_action_get_result_reply = Some(cb);
  }

  /// Register a schema. Idempotent on type name; a newly added schema is
  /// reported through the type notification.
  pub fn add_schema(&self, dyn_type: DynamicType, type_id: TypeIdentifier) {
    let added = {
      let mut state = self.state.lock().unwrap();
      state.registry.add_schema(Arc::clone(&dyn_type), type_id)
    };
    if added {
      self.writer.write_schema(&dyn_type);
    }
  }

  pub fn add_topic(&self, topic: &TopicDescription) {
    info!("Adding topic: {}.", topic.name);
    self.writer.write_topic(topic);
  }

  pub fn add_service(&self, service: &RpcTopic) {
    info!("Adding service: {}.", service.name);
    self.writer.write_service(service);
  }

  pub fn add_action(&self, action: &RpcAction) {
    info!("Adding action: {}.", action.name);
    self.writer.write_action(action);
  }

  /// Resolve a type identifier: in-memory map, then the transport's
  /// type-object registry, then the application's type query callback.
  pub fn get_type_identifier(&self, type_name: &str) -> EnablerResult<TypeIdentifier> {
    let resolved = {
      let mut state = self.state.lock().unwrap();
      state
        .registry
        .get_type_identifier(type_name, self.callbacks.dds.type_query.as_deref())?
    };
    if resolved.newly_discovered {
      // The schema came from the transport registry; report it so the
      // application can persist it.
      self.writer.write_schema(&resolved.dyn_type);
    }
    Ok(resolved.type_id)
  }

  pub fn get_serialized_data(&self, type_name: &str, json: &str) -> EnablerResult<Payload> {
    let state = self.state.lock().unwrap();
    state
      .registry
      .get_serialized_data(type_name, json, &self.payload_pool)
  }

  /// Mint the next request id. Strictly increasing for the process
  /// lifetime, never reused.
  pub fn new_request_id(&self) -> u64 {
    let mut state = self.state.lock().unwrap();
    state.requests_id += 1;
    state.requests_id
  }

  /// Record a request id for a goal. Goal requests insert, result requests
  /// update an existing entry.
  pub fn store_action_request(
    &self,
    action_name: &str,
    goal_id: GoalId,
    request_id: u64,
    subtopic: ActionSubtopic,
    protocol: Protocol,
  ) -> EnablerResult<()> {
    let mut state = self.state.lock().unwrap();
    match state.action_requests.get_mut(&goal_id) {
      Some(info) => {
        if info.action_name != action_name {
          error!(
            "Action name mismatch for goal {goal_id}: expected {}, got {action_name}.",
            info.action_name
          );
          return Err(EnablerError::NoSuchGoal(goal_id));
        }
        if subtopic == ActionSubtopic::Goal {
          error!("Cannot store goal request for {goal_id}: goal id already exists.");
          return Err(EnablerError::NoSuchGoal(goal_id));
        }
        info.set_request(request_id, subtopic);
        Ok(())
      }
      None => {
        if subtopic != ActionSubtopic::Goal {
          error!(
            "Cannot store {subtopic:?} request for unknown goal {goal_id} of action {action_name}."
          );
          return Err(EnablerError::NoSuchGoal(goal_id));
        }
        state
          .action_requests
          .insert(goal_id, ActionRequestInfo::new(action_name, request_id, protocol));
        Ok(())
      }
    }
  }

  /// Deliver or cache a result for a goal. If a get-result request is
  /// already pending, the reply goes out immediately; otherwise the result
  /// is cached until the request arrives.
  pub fn handle_action_result(
    &self,
    action_name: &str,
    goal_id: GoalId,
    reply_json: String,
  ) -> EnablerResult<()> {
    let pending_request = {
      let mut state = self.state.lock().unwrap();
      let Some(info) = state.action_requests.get_mut(&goal_id) else {
        error!("Failed to handle action result: goal {goal_id} not found.");
        return Err(EnablerError::NoSuchGoal(goal_id));
      };
      if info.action_name != action_name {
        error!(
          "Action name mismatch for goal {goal_id}: expected {}, got {action_name}.",
          info.action_name
        );
        return Err(EnablerError::NoSuchGoal(goal_id));
      }
      if info.result_request_id != 0 {
        Some(info.result_request_id)
      } else if info.set_result(reply_json.clone()) {
        None
      } else {
        error!("Failed to store result for goal {goal_id}: result already set.");
        return Err(EnablerError::SerializationFailed(format!(
          "result already cached for goal {goal_id}"
        )));
      }
    };

    if let Some(request_id) = pending_request {
      let internal = self.internal.lock().unwrap();
      if let Some(cb) = &internal.send_action_get_result_reply {
        cb(action_name, &goal_id, &reply_json, request_id);
      }
    }
    Ok(())
  }

  /// Mark an erase reason on the correlation record; the record is removed
  /// once both the result and a terminal status have been seen, or
  /// immediately on forced erase.
  pub fn erase_action_uuid(&self, goal_id: GoalId, reason: ActionEraseReason) {
    let mut state = self.state.lock().unwrap();
    let removable = state
      .action_requests
      .get_mut(&goal_id)
      .map(|info| info.erase(reason));
    if removable == Some(true) {
      debug!("Erasing correlation record of goal {goal_id}.");
      state.action_requests.remove(&goal_id);
    }
  }

  /// The goal-accepted stamp of a live goal, or `None` when the goal is not
  /// known under this action.
  pub fn is_uuid_active(&self, action_name: &str, goal_id: GoalId) -> Option<Time> {
    let state = self.state.lock().unwrap();
    state
      .action_requests
      .get(&goal_id)
      .filter(|info| info.action_name == action_name)
      .map(|info| info.goal_accepted_stamp)
  }

  pub fn action_protocol(&self, action_name: &str, goal_id: GoalId) -> Protocol {
    let state = self.state.lock().unwrap();
    state
      .action_requests
      .get(&goal_id)
      .filter(|info| info.action_name == action_name)
      .map_or(Protocol::Unknown, |info| info.protocol)
  }

  /// Of the given goals, those currently active under the action, with
  /// their accepted stamps.
  pub fn filter_active_goals(
    &self,
    action_name: &str,
    goal_ids: &[GoalId],
  ) -> Vec<(GoalId, Time)> {
    let state = self.state.lock().unwrap();
    goal_ids
      .iter()
      .filter_map(|goal_id| {
        state
          .action_requests
          .get(goal_id)
          .filter(|info| info.action_name == action_name)
          .map(|info| (*goal_id, info.goal_accepted_stamp))
      })
      .collect()
  }

  fn uuid_for_request(&self, request_id: u64, subtopic: ActionSubtopic) -> Option<GoalId> {
    if request_id == 0 {
      return None;
    }
    let state = self.state.lock().unwrap();
    state
      .action_requests
      .iter()
      .find(|(_, info)| info.request_id(subtopic) == Some(request_id))
      .map(|(goal_id, _)| *goal_id)
  }

  fn next_request_id_stamped(&self, data: &mut PayloadData) -> u64 {
    let request_id = self.new_request_id();
    // The transport correlates the eventual reply through this identity.
    data.sent_request_id = Some(request_id);
    request_id
  }

  /// Inbound dispatch: classify the topic and route the sample to the
  /// matching callback, updating correlation state on the way.
  pub fn add_data(&self, topic: &TopicDescription, data: &mut PayloadData) {
    debug!("Adding data in topic: {}.", topic.name);

    let (dyn_type, msg) = {
      let mut state = self.state.lock().unwrap();
      let Some(dyn_type) = state.registry.dynamic_type(&topic.type_name) else {
        warn!("Schema for type {} not available.", topic.type_name);
        return;
      };
      state.unique_sequence_number += 1;
      let msg = Message::from_data(topic, data, state.unique_sequence_number);
      (dyn_type, msg)
    };

    if msg.payload.is_empty() {
      warn!("Received sample with no payload in topic {}.", topic.name);
      return;
    }

    let rpc_info = RpcInfo::classify(&topic.name);
    if rpc_info.role == RpcRole::None {
      self.writer.write_data(&msg, &dyn_type);
      return;
    }

    let Some(json) = self.writer.render_sample(&msg, &dyn_type) else {
      return; // malformed payload, already logged
    };
    self.dispatch_rpc(&rpc_info, &json, data, msg.publish_time_nanos());
  }

  fn dispatch_rpc(&self, rpc_info: &RpcInfo, json: &str, data: &mut PayloadData, publish_time: i64) {
    match rpc_info.role {
      RpcRole::Service { side: ServiceSide::Request } => {
        let Some(service_name) = rpc_info.service_name.as_deref() else { return };
        let request_id = self.next_request_id_stamped(data);
        self
          .writer
          .write_service_request(service_name, json, request_id, publish_time);
      }

      RpcRole::Service { side: ServiceSide::Reply } => {
        let Some(service_name) = rpc_info.service_name.as_deref() else { return };
        let Some(request_id) = data.related_request_id else {
          warn!("Dropping orphaned reply on {}: no related request.", rpc_info.topic);
          return;
        };
        self
          .writer
          .write_service_reply(service_name, json, request_id, publish_time);
      }

      RpcRole::Action { subtopic, side } => {
        let Some(action_name) = rpc_info.action_name.as_deref() else { return };
        self.dispatch_action(
          action_name,
          rpc_info.protocol,
          subtopic,
          side,
          json,
          data,
          publish_time,
        );
      }

      RpcRole::ActionFeedback => {
        let Some(action_name) = rpc_info.action_name.as_deref() else { return };
        let Some(feedback) = json::parse_feedback(json) else {
          error!("Malformed feedback message on {}.", rpc_info.topic);
          return;
        };
        if self.is_uuid_active(action_name, feedback.goal_id).is_none() {
          warn!(
            "Dropping feedback for unknown goal {} of action {action_name}.",
            feedback.goal_id
          );
          return;
        }
        self.writer.write_action_feedback(
          action_name,
          &feedback.feedback.to_string(),
          &feedback.goal_id,
          publish_time,
        );
      }

      RpcRole::ActionStatus => {
        let Some(action_name) = rpc_info.action_name.as_deref() else { return };
        let Some(statuses) = json::parse_status_array(json) else {
          error!("Malformed status message on {}.", rpc_info.topic);
          return;
        };
        for goal_status in statuses.status_list {
          let goal_id = goal_status.goal_info.goal_id;
          if self.is_uuid_active(action_name, goal_id).is_none() {
            debug!("Dropping status for unknown goal {goal_id} of action {action_name}.");
            continue;
          }
          self
            .writer
            .write_action_status(action_name, &goal_id, goal_status.status, publish_time);
          if goal_status.status.is_terminal() {
            self.erase_action_uuid(goal_id, ActionEraseReason::FinalStatus);
          }
        }
      }

      RpcRole::None => {}
    }
  }

  #[allow(clippy::too_many_arguments)]
  fn dispatch_action(
    &self,
    action_name: &str,
    protocol: Protocol,
    subtopic: ActionSubtopic,
    side: ServiceSide,
    json: &str,
    data: &mut PayloadData,
    publish_time: i64,
  ) {
    match (side, subtopic) {
      // Client side: replies to our own requests.
      (ServiceSide::Reply, ActionSubtopic::Goal) => {
        let Some(request_id) = data.related_request_id else {
          warn!("Dropping orphaned goal reply of action {action_name}.");
          return;
        };
        let Some(goal_id) = self.uuid_for_request(request_id, ActionSubtopic::Goal) else {
          warn!("Goal reply of action {action_name} does not match any sent goal.");
          return;
        };
        let Some(reply) = json::parse_goal_reply(json) else {
          error!("Malformed goal reply of action {action_name}.");
          return;
        };
        if reply.accepted {
          // Request the result right away, so the reply arrives as soon as
          // the goal terminates.
          let internal = self.internal.lock().unwrap();
          if let Some(cb) = &internal.send_action_get_result_request {
            cb(action_name, &goal_id);
          }
        } else {
          self.erase_action_uuid(goal_id, ActionEraseReason::Forced);
        }
      }

      (ServiceSide::Reply, ActionSubtopic::Result) => {
        let Some(request_id) = data.related_request_id else {
          warn!("Dropping orphaned result reply of action {action_name}.");
          return;
        };
        let Some(goal_id) = self.uuid_for_request(request_id, ActionSubtopic::Result) else {
          warn!("Result reply of action {action_name} does not match any request.");
          return;
        };
        let Some(reply) = json::parse_result_reply(json) else {
          error!("Malformed result reply of action {action_name}.");
          return;
        };
        self.writer.write_action_result(
          action_name,
          &reply.result.to_string(),
          &goal_id,
          publish_time,
        );
        self.erase_action_uuid(goal_id, ActionEraseReason::Result);
      }

      (ServiceSide::Reply, ActionSubtopic::Cancel) => {
        let Some(reply) = json::parse_cancel_reply(json) else {
          error!("Malformed cancel reply of action {action_name}.");
          return;
        };
        if reply.return_code == crate::rpc::CancelCode::None {
          for goal_info in reply.goals_canceling {
            self.writer.write_action_status(
              action_name,
              &goal_info.goal_id,
              crate::rpc::StatusCode::Canceling,
              publish_time,
            );
          }
        } else {
          warn!(
            "Cancel request of action {action_name} failed with {:?}.",
            reply.return_code
          );
          self.writer.write_action_status(
            action_name,
            &GoalId::ZERO,
            crate::rpc::StatusCode::CancelRequestFailed,
            publish_time,
          );
        }
      }

      // Server side: requests from external clients.
      (ServiceSide::Request, ActionSubtopic::Goal) => {
        let Some(goal_id) = json::goal_id_from_request(json) else {
          error!("Failed to extract goal id from send_goal request of action {action_name}.");
          return;
        };
        let request_id = self.next_request_id_stamped(data);
        if self
          .store_action_request(action_name, goal_id, request_id, ActionSubtopic::Goal, protocol)
          .is_err()
        {
          return; // already logged
        }
        let goal_json = json::parse_goal_request_goal(json).unwrap_or_else(|| json.to_string());
        let verdict =
          self
            .writer
            .write_action_goal_request(action_name, &goal_json, &goal_id, publish_time);
        if let Some(accepted) = verdict {
          {
            let internal = self.internal.lock().unwrap();
            if let Some(cb) = &internal.send_action_send_goal_reply {
              cb(action_name, request_id, accepted);
            }
          }
          if !accepted {
            self.erase_action_uuid(goal_id, ActionEraseReason::Forced);
          }
        }
      }

      (ServiceSide::Request, ActionSubtopic::Cancel) => {
        let Some(cancel) = json::parse_cancel_request(json) else {
          error!("Malformed cancel request of action {action_name}.");
          return;
        };
        let request_id = self.next_request_id_stamped(data);
        self.writer.write_action_cancel_request(
          action_name,
          &cancel.goal_info.goal_id,
          cancel.goal_info.stamp.to_nanos(),
          request_id,
          publish_time,
        );
      }

      (ServiceSide::Request, ActionSubtopic::Result) => {
        let Some(goal_id) = json::goal_id_from_request(json) else {
          error!("Failed to extract goal id from get_result request of action {action_name}.");
          return;
        };
        let request_id = self.next_request_id_stamped(data);
        if self
          .store_action_request(action_name, goal_id, request_id, ActionSubtopic::Result, protocol)
          .is_err()
        {
          return; // already logged
        }
        let cached = {
          let state = self.state.lock().unwrap();
          state
            .action_requests
            .get(&goal_id)
            .and_then(|info| info.cached_result().map(str::to_string))
        };
        if let Some(result) = cached {
          let internal = self.internal.lock().unwrap();
          if let Some(cb) = &internal.send_action_get_result_reply {
            cb(action_name, &goal_id, &result, request_id);
          }
        }
      }
    }
  }
}
