//! Top-level façade: one object wiring the handler, the participant and the
//! application callbacks together.

use std::sync::Arc;

#[allow(unused_imports)]
use log::{debug, error, info, warn};

use crate::{
  callbacks::CallbackSet,
  config::EnablerConfiguration,
  error::EnablerResult,
  handler::Handler,
  participant::{DiscoveryService, EnablerParticipant},
  payload::PayloadPool,
  registry::TypeObjectRegistry,
  rpc::{CancelCode, GoalId, Protocol, StatusCode},
  types::{DynamicType, TypeIdentifier},
};

/// The application-facing enabler: register callbacks once, then interact
/// with topics, services and actions through this façade.
pub struct DdsEnabler {
  handler: Arc<Handler>,
  participant: Arc<EnablerParticipant>,
  payload_pool: Arc<PayloadPool>,
}

impl DdsEnabler {
  pub fn new(
    config: EnablerConfiguration,
    callbacks: CallbackSet,
    discovery: Arc<dyn DiscoveryService>,
    transport_registry: Option<Arc<dyn TypeObjectRegistry>>,
  ) -> Arc<DdsEnabler> {
    let callbacks = Arc::new(callbacks);
    let payload_pool = PayloadPool::new();
    let handler = Handler::new(
      Arc::clone(&payload_pool),
      Arc::clone(&callbacks),
      transport_registry,
    );
    let participant = EnablerParticipant::new(
      config,
      Arc::clone(&handler),
      discovery,
      Arc::clone(&callbacks),
    );

    // Internal wiring. The closures hold the participant weakly: the
    // participant already owns the handler, and the cycle must not keep
    // either alive.
    let weak = Arc::downgrade(&participant);
    handler.set_send_action_get_result_request_callback(Box::new(move |action_name, goal_id| {
      let Some(participant) = weak.upgrade() else {
        return false;
      };
      // The participant cancels the goal itself when the request fails.
      participant
        .send_action_get_result_request(action_name, *goal_id)
        .is_ok()
    }));

    let weak = Arc::downgrade(&participant);
    handler.set_send_action_send_goal_reply_callback(Box::new(
      move |action_name, request_id, accepted| {
        let Some(participant) = weak.upgrade() else {
          return;
        };
        if let Err(e) =
          participant.send_action_send_goal_reply(action_name, request_id, accepted)
        {
          error!("Could not send goal reply for action {action_name}: {e}");
        }
      },
    ));

    let weak = Arc::downgrade(&participant);
    handler.set_send_action_get_result_reply_callback(Box::new(
      move |action_name, goal_id, reply_json, request_id| {
        let Some(participant) = weak.upgrade() else {
          return false;
        };
        participant
          .send_action_get_result_reply(action_name, *goal_id, reply_json, request_id)
          .map_err(|e| error!("Could not send result reply for action {action_name}: {e}"))
          .is_ok()
      },
    ));

    Arc::new(DdsEnabler {
      handler,
      participant,
      payload_pool,
    })
  }

  pub fn handler(&self) -> &Arc<Handler> {
    &self.handler
  }

  pub fn participant(&self) -> &Arc<EnablerParticipant> {
    &self.participant
  }

  pub fn payload_pool(&self) -> &Arc<PayloadPool> {
    &self.payload_pool
  }

  /// Register a schema known to the application ahead of discovery.
  pub fn add_schema(&self, dyn_type: DynamicType, type_id: TypeIdentifier) {
    self.handler.add_schema(dyn_type, type_id);
  }

  pub fn publish(&self, topic_name: &str, json: &str) -> EnablerResult<()> {
    self.participant.publish(topic_name, json)
  }

  pub fn send_service_request(&self, service_name: &str, json: &str) -> EnablerResult<u64> {
    self.send_service_request_with_protocol(service_name, json, Protocol::Ros2)
  }

  pub fn send_service_request_with_protocol(
    &self,
    service_name: &str,
    json: &str,
    protocol: Protocol,
  ) -> EnablerResult<u64> {
    self.participant.send_service_request(service_name, json, protocol)
  }

  pub fn announce_service(&self, service_name: &str, protocol: Protocol) -> EnablerResult<()> {
    self.participant.announce_service(service_name, protocol)
  }

  pub fn revoke_service(&self, service_name: &str) -> EnablerResult<()> {
    self.participant.revoke_service(service_name)
  }

  pub fn send_service_reply(
    &self,
    service_name: &str,
    json: &str,
    request_id: u64,
  ) -> EnablerResult<()> {
    self.participant.send_service_reply(service_name, json, request_id)
  }

  pub fn announce_action(&self, action_name: &str) -> EnablerResult<()> {
    self.announce_action_with_protocol(action_name, Protocol::Ros2)
  }

  pub fn announce_action_with_protocol(
    &self,
    action_name: &str,
    protocol: Protocol,
  ) -> EnablerResult<()> {
    self.participant.announce_action(action_name, protocol)
  }

  pub fn revoke_action(&self, action_name: &str) -> EnablerResult<()> {
    self.participant.revoke_action(action_name)
  }

  pub fn send_action_goal(&self, action_name: &str, json: &str) -> EnablerResult<GoalId> {
    self.send_action_goal_with_protocol(action_name, json, Protocol::Ros2)
  }

  pub fn send_action_goal_with_protocol(
    &self,
    action_name: &str,
    json: &str,
    protocol: Protocol,
  ) -> EnablerResult<GoalId> {
    self.participant.send_action_goal(action_name, json, protocol)
  }

  pub fn send_action_get_result_request(
    &self,
    action_name: &str,
    goal_id: GoalId,
  ) -> EnablerResult<()> {
    self.participant.send_action_get_result_request(action_name, goal_id)
  }

  pub fn cancel_action_goal(
    &self,
    action_name: &str,
    goal_id: GoalId,
    timestamp_nanos: i64,
  ) -> EnablerResult<()> {
    self.participant.cancel_action_goal(action_name, goal_id, timestamp_nanos)
  }

  pub fn send_action_send_goal_reply(
    &self,
    action_name: &str,
    request_id: u64,
    accepted: bool,
  ) -> EnablerResult<()> {
    self
      .participant
      .send_action_send_goal_reply(action_name, request_id, accepted)
  }

  pub fn send_action_cancel_goal_reply(
    &self,
    action_name: &str,
    goal_ids: &[GoalId],
    cancel_code: CancelCode,
    request_id: u64,
  ) -> EnablerResult<()> {
    self
      .participant
      .send_action_cancel_goal_reply(action_name, goal_ids, cancel_code, request_id)
  }

  pub fn send_action_result(
    &self,
    action_name: &str,
    goal_id: GoalId,
    status_code: StatusCode,
    json_result: &str,
  ) -> EnablerResult<()> {
    self
      .participant
      .send_action_result(action_name, goal_id, status_code, json_result)
  }

  pub fn send_action_get_result_reply(
    &self,
    action_name: &str,
    goal_id: GoalId,
    reply_json: &str,
    request_id: u64,
  ) -> EnablerResult<()> {
    self
      .participant
      .send_action_get_result_reply(action_name, goal_id, reply_json, request_id)
  }

  pub fn send_action_feedback(
    &self,
    action_name: &str,
    json_feedback: &str,
    goal_id: GoalId,
  ) -> EnablerResult<()> {
    self
      .participant
      .send_action_feedback(action_name, json_feedback, goal_id)
  }

  pub fn update_action_status(
    &self,
    action_name: &str,
    goal_id: GoalId,
    status_code: StatusCode,
  ) -> EnablerResult<()> {
    self
      .participant
      .update_action_status(action_name, goal_id, status_code)
  }
}
