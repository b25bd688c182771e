//! The participant façade: the bus-facing half of the enabler.
//!
//! Owns the internal readers (injection queues the transport drains), the
//! discovery aggregation state, and the public RPC operations. One mutex
//! guards the mutable state; a condition variable lets API threads wait,
//! bounded, for the transport's discovery thread to construct a reader.

use std::{
  collections::{BTreeMap, BTreeSet, VecDeque},
  sync::{Arc, Condvar, Mutex, MutexGuard},
};

#[allow(unused_imports)]
use log::{debug, error, info, warn};

use crate::{
  callbacks::CallbackSet,
  config::EnablerConfiguration,
  discovery::{DiscoveryAggregator, DiscoveryEvent},
  error::{EnablerError, EnablerResult},
  gid::Gid,
  handler::Handler,
  names,
  payload::PayloadData,
  rpc::{json, ActionEraseReason, ActionSubtopic, CancelCode, GoalId, Protocol, ServiceSide, StatusCode},
  topic::{EndpointHandle, TopicDescription},
};

/// Name of the transport's internal type-object topic; its discoveries are
/// not fed to the aggregator.
pub const TYPE_OBJECT_TOPIC_NAME: &str = "__internal__/type_object";

/// Sink the transport installs to drain a reader.
pub type DataHook = Arc<dyn Fn(&TopicDescription, PayloadData) + Send + Sync>;

/// Transport seam for dynamic endpoints. Implementations must not call back
/// into [`EnablerParticipant::create_reader`] synchronously from
/// `add_endpoint`; the reader is constructed from the discovery thread.
pub trait DiscoveryService: Send + Sync {
  fn add_endpoint(&self, topic: &TopicDescription) -> EndpointHandle;
  fn remove_endpoint(&self, handle: EndpointHandle) -> bool;
}

/// In-process queue receiving samples injected by the participant, distinct
/// from a real subscriber on the bus. The transport either polls [`take`]
/// or installs a data hook.
///
/// [`take`]: InternalReader::take
pub struct InternalReader {
  topic: TopicDescription,
  queue: Mutex<VecDeque<PayloadData>>,
  data_hook: Mutex<Option<DataHook>>,
}

impl InternalReader {
  fn new(topic: TopicDescription) -> Arc<InternalReader> {
    Arc::new(InternalReader {
      topic,
      queue: Mutex::new(VecDeque::new()),
      data_hook: Mutex::new(None),
    })
  }

  pub fn topic(&self) -> &TopicDescription {
    &self.topic
  }

  /// Install the drain hook. Samples injected before the hook was set are
  /// flushed through it immediately.
  pub fn set_data_hook(&self, hook: DataHook) {
    let backlog: Vec<PayloadData> = {
      let mut queue = self.queue.lock().unwrap();
      let backlog = queue.drain(..).collect();
      *self.data_hook.lock().unwrap() = Some(Arc::clone(&hook));
      backlog
    };
    for data in backlog {
      hook(&self.topic, data);
    }
  }

  pub fn simulate_data_reception(&self, data: PayloadData) {
    let hook = self.data_hook.lock().unwrap().clone();
    match hook {
      Some(hook) => hook(&self.topic, data),
      None => self.queue.lock().unwrap().push_back(data),
    }
  }

  pub fn take(&self) -> Option<PayloadData> {
    self.queue.lock().unwrap().pop_front()
  }
}

struct ParticipantState {
  readers: BTreeMap<String, Arc<InternalReader>>,
  aggregator: DiscoveryAggregator,
  /// Topic names this enabler simulated itself; their discoveries do not
  /// count as external servers.
  announced_topics: BTreeSet<String>,
  /// Every dynamic endpoint created by this participant, for revoke and
  /// final cleanup.
  dynamic_endpoints: BTreeMap<String, EndpointHandle>,
}

pub struct EnablerParticipant {
  state: Mutex<ParticipantState>,
  cv: Condvar,
  handler: Arc<Handler>,
  discovery: Arc<dyn DiscoveryService>,
  callbacks: Arc<CallbackSet>,
  config: EnablerConfiguration,
  source_guid: Gid,
}

impl EnablerParticipant {
  pub fn new(
    config: EnablerConfiguration,
    handler: Arc<Handler>,
    discovery: Arc<dyn DiscoveryService>,
    callbacks: Arc<CallbackSet>,
  ) -> Arc<EnablerParticipant> {
    Arc::new(EnablerParticipant {
      state: Mutex::new(ParticipantState {
        readers: BTreeMap::new(),
        aggregator: DiscoveryAggregator::new(),
        announced_topics: BTreeSet::new(),
        dynamic_endpoints: BTreeMap::new(),
      }),
      cv: Condvar::new(),
      handler,
      discovery,
      callbacks,
      config,
      source_guid: Gid::new_random(),
    })
  }

  pub fn source_guid(&self) -> Gid {
    self.source_guid
  }

  /// Called by the transport's discovery thread for every discovered topic.
  /// Constructs the internal reader, feeds the aggregator, and wakes any
  /// thread waiting for this reader.
  pub fn create_reader(&self, topic: &TopicDescription) -> Arc<InternalReader> {
    if topic.name == TYPE_OBJECT_TOPIC_NAME {
      // blank reader, not tracked
      return InternalReader::new(topic.clone());
    }

    let (reader, events) = {
      let mut state = self.state.lock().unwrap();
      let reader = InternalReader::new(topic.clone());
      state.readers.insert(topic.name.clone(), Arc::clone(&reader));
      let rpc_info = crate::names::RpcInfo::classify(&topic.name);
      let locally_announced = state.announced_topics.contains(&topic.name);
      let events = state
        .aggregator
        .topic_discovered(&rpc_info, topic, locally_announced);
      (reader, events)
    };
    self.cv.notify_all();

    self.handler.add_topic(topic);
    for event in events {
      match event {
        DiscoveryEvent::Service(service) => self.handler.add_service(&service),
        DiscoveryEvent::Action(action) => self.handler.add_action(&action),
      }
    }
    reader
  }

  /// Publish a JSON sample on a topic. A topic without a reader is resolved
  /// through the topic query callback and a dynamic endpoint; the bounded
  /// wait lets the discovery thread construct the reader.
  pub fn publish(&self, topic_name: &str, json: &str) -> EnablerResult<()> {
    self.publish_inner(topic_name, json, None)
  }

  /// Like [`publish`], but stamps the sample's related-sample-identity with
  /// `request_id` so replies can be correlated.
  ///
  /// [`publish`]: EnablerParticipant::publish
  pub fn publish_rpc(&self, topic_name: &str, json: &str, request_id: u64) -> EnablerResult<()> {
    self.publish_inner(topic_name, json, Some(request_id))
  }

  fn publish_inner(
    &self,
    topic_name: &str,
    json: &str,
    request_id: Option<u64>,
  ) -> EnablerResult<()> {
    let existing = self.state.lock().unwrap().readers.get(topic_name).cloned();
    let reader = match existing {
      Some(reader) => reader,
      None => {
        // Resolve the topic and its type with no lock held: the type query
        // and notification callbacks may run here.
        let topic_info = self
          .callbacks
          .dds
          .topic_query
          .as_ref()
          .and_then(|query| query(topic_name))
          .ok_or_else(|| {
            error!(
              "Failed to publish data in topic {topic_name} : topic is unknown and topic \
               query did not resolve it."
            );
            EnablerError::UnknownTopic(topic_name.to_string())
          })?;

        self.handler.get_type_identifier(&topic_info.type_name)?;

        let topic = TopicDescription::new(
          topic_name,
          &topic_info.type_name,
          &topic_info.serialized_qos,
        );

        let mut state = self.state.lock().unwrap();
        if let Some(reader) = state.readers.get(topic_name).cloned() {
          // discovery beat us to it
          reader
        } else {
          let handle = self.discovery.add_endpoint(&topic);
          state.dynamic_endpoints.insert(topic_name.to_string(), handle);
          let (state, reader) = self.wait_for_reader(state, topic_name)?;
          drop(state);
          reader
        }
      }
    };

    if !self.config.initial_publish_wait.is_zero() {
      std::thread::sleep(self.config.initial_publish_wait);
    }

    let type_name = reader.topic().type_name.clone();
    let payload = self.handler.get_serialized_data(&type_name, json)?;
    let mut data = PayloadData::new(payload, self.source_guid);
    data.related_request_id = request_id;
    reader.simulate_data_reception(data);
    Ok(())
  }

  fn wait_for_reader<'a>(
    &self,
    state: MutexGuard<'a, ParticipantState>,
    topic_name: &str,
  ) -> EnablerResult<(MutexGuard<'a, ParticipantState>, Arc<InternalReader>)> {
    let (state, _timeout) = self
      .cv
      .wait_timeout_while(state, self.config.reader_wait_timeout, |s| {
        !s.readers.contains_key(topic_name)
      })
      .unwrap();
    match state.readers.get(topic_name).cloned() {
      Some(reader) => Ok((state, reader)),
      None => {
        error!("Timed out waiting for reader of topic {topic_name}.");
        Err(EnablerError::ReaderCreationFailed(topic_name.to_string()))
      }
    }
  }

  /// Simulate one endpoint and wait for the matching reader.
  fn create_topic_writer<'a>(
    &self,
    mut state: MutexGuard<'a, ParticipantState>,
    topic: &TopicDescription,
  ) -> EnablerResult<(MutexGuard<'a, ParticipantState>, EndpointHandle)> {
    state.announced_topics.insert(topic.name.clone());
    let handle = self.discovery.add_endpoint(topic);
    state.dynamic_endpoints.insert(topic.name.clone(), handle);
    let (state, _reader) = self.wait_for_reader(state, &topic.name)?;
    Ok((state, handle))
  }

  /// Announce this enabler as the server of a service. Requires the service
  /// query callback to provide the type metadata.
  pub fn announce_service(&self, service_name: &str, protocol: Protocol) -> EnablerResult<()> {
    let request_name = names::service_topic(service_name, ServiceSide::Request, protocol)?;
    let reply_name = names::service_topic(service_name, ServiceSide::Reply, protocol)?;

    let service_info = self
      .callbacks
      .service
      .service_query
      .as_ref()
      .and_then(|query| query(service_name))
      .ok_or_else(|| {
        error!("Cannot announce service {service_name}: service query failed.");
        EnablerError::UnknownTopic(service_name.to_string())
      })?;

    // Both types must be resolvable before the service goes on the bus.
    self.handler.get_type_identifier(&service_info.request.type_name)?;
    self.handler.get_type_identifier(&service_info.reply.type_name)?;

    let request_topic = TopicDescription::new(
      &request_name,
      &service_info.request.type_name,
      &service_info.request.serialized_qos,
    );
    let reply_topic = TopicDescription::new(
      &reply_name,
      &service_info.reply.type_name,
      &service_info.reply.serialized_qos,
    );

    let state = self.state.lock().unwrap();
    if state
      .aggregator
      .service(service_name)
      .is_some_and(|svc| svc.enabler_as_server)
    {
      return Err(EnablerError::AlreadyAnnounced(service_name.to_string()));
    }

    let (state, request_handle) = self.create_topic_writer(state, &request_topic)?;
    let (mut state, _reply_handle) = self.create_topic_writer(state, &reply_topic)?;

    let svc = state.aggregator.service_entry(service_name, protocol);
    svc.enabler_as_server = true;
    svc.endpoint_request = Some(request_handle);
    info!("Announced service {service_name}.");
    Ok(())
  }

  /// Stop serving a service. The record survives while an external server
  /// remains.
  pub fn revoke_service(&self, service_name: &str) -> EnablerResult<()> {
    let handles = {
      let mut state = self.state.lock().unwrap();
      Self::revoke_service_nts(&mut state, service_name)?
    };
    for handle in handles {
      self.discovery.remove_endpoint(handle);
    }
    info!("Revoked service {service_name}.");
    Ok(())
  }

  fn revoke_service_nts(
    state: &mut ParticipantState,
    service_name: &str,
  ) -> EnablerResult<Vec<EndpointHandle>> {
    let Some(svc) = state.aggregator.service_mut(service_name) else {
      return Err(EnablerError::NotAnnounced(service_name.to_string()));
    };
    if !svc.enabler_as_server {
      return Err(EnablerError::NotAnnounced(service_name.to_string()));
    }
    svc.enabler_as_server = false;
    let protocol = svc.protocol;
    let external = svc.external_server;
    let mut handles: Vec<EndpointHandle> = svc.endpoint_request.take().into_iter().collect();

    let request_name = names::service_topic(service_name, ServiceSide::Request, protocol)?;
    let reply_name = names::service_topic(service_name, ServiceSide::Reply, protocol)?;
    state.readers.remove(&request_name);
    state.announced_topics.remove(&request_name);
    state.announced_topics.remove(&reply_name);
    state.dynamic_endpoints.remove(&request_name);
    handles.extend(state.dynamic_endpoints.remove(&reply_name));

    if !external {
      state.aggregator.remove_service(service_name);
    }
    Ok(handles)
  }

  /// Send a service request; returns the minted request id used to match
  /// the reply.
  pub fn send_service_request(
    &self,
    service_name: &str,
    json: &str,
    protocol: Protocol,
  ) -> EnablerResult<u64> {
    let topic_name = names::service_topic(service_name, ServiceSide::Request, protocol)?;
    let request_id = self.handler.new_request_id();
    self.publish_rpc(&topic_name, json, request_id)?;
    Ok(request_id)
  }

  /// Send the reply to a previously notified request. The service's wire
  /// protocol must have been determined by discovery or announcement.
  pub fn send_service_reply(
    &self,
    service_name: &str,
    json: &str,
    request_id: u64,
  ) -> EnablerResult<()> {
    let protocol = self.get_service_protocol(service_name);
    if protocol == Protocol::Unknown {
      return Err(EnablerError::UnknownRpcProtocol(service_name.to_string()));
    }
    let topic_name = names::service_topic(service_name, ServiceSide::Reply, protocol)?;
    self.publish_rpc(&topic_name, json, request_id)
  }

  pub fn get_service_protocol(&self, service_name: &str) -> Protocol {
    let state = self.state.lock().unwrap();
    state
      .aggregator
      .service(service_name)
      .map_or(Protocol::Unknown, |svc| svc.protocol)
  }

  /// Announce this enabler as the server of an action: all three
  /// sub-services plus the feedback and status topics. ROS2 only.
  pub fn announce_action(&self, action_name: &str, protocol: Protocol) -> EnablerResult<()> {
    if protocol != Protocol::Ros2 {
      return Err(EnablerError::UnsupportedProtocol(protocol));
    }

    let action_info = self
      .callbacks
      .action
      .action_query
      .as_ref()
      .and_then(|query| query(action_name))
      .ok_or_else(|| {
        error!("Cannot announce action {action_name}: action query failed.");
        EnablerError::UnknownTopic(action_name.to_string())
      })?;

    for info in [
      &action_info.goal.request,
      &action_info.goal.reply,
      &action_info.result.request,
      &action_info.result.reply,
      &action_info.cancel.request,
      &action_info.cancel.reply,
      &action_info.feedback,
      &action_info.status,
    ] {
      self.handler.get_type_identifier(&info.type_name)?;
    }

    let mut state = self.state.lock().unwrap();
    if state
      .aggregator
      .action(action_name)
      .is_some_and(|act| act.enabler_as_server)
    {
      return Err(EnablerError::AlreadyAnnounced(action_name.to_string()));
    }

    for (subtopic, service_info) in [
      (ActionSubtopic::Goal, &action_info.goal),
      (ActionSubtopic::Result, &action_info.result),
      (ActionSubtopic::Cancel, &action_info.cancel),
    ] {
      let service_name = names::action_service_name(action_name, subtopic);
      let request_topic = TopicDescription::new(
        &names::action_service_topic(action_name, subtopic, ServiceSide::Request, protocol)?,
        &service_info.request.type_name,
        &service_info.request.serialized_qos,
      );
      let reply_topic = TopicDescription::new(
        &names::action_service_topic(action_name, subtopic, ServiceSide::Reply, protocol)?,
        &service_info.reply.type_name,
        &service_info.reply.serialized_qos,
      );

      let (s, request_handle) = self.create_topic_writer(state, &request_topic)?;
      let (mut s, _reply_handle) = self.create_topic_writer(s, &reply_topic)?;
      let svc = s.aggregator.service_entry(&service_name, protocol);
      svc.enabler_as_server = true;
      svc.endpoint_request = Some(request_handle);
      state = s;
    }

    let feedback_topic = TopicDescription::new(
      &names::action_feedback_topic(action_name),
      &action_info.feedback.type_name,
      &action_info.feedback.serialized_qos,
    );
    let status_topic = TopicDescription::new(
      &names::action_status_topic(action_name),
      &action_info.status.type_name,
      &action_info.status.serialized_qos,
    );
    let (state, _feedback_handle) = self.create_topic_writer(state, &feedback_topic)?;
    let (mut state, _status_handle) = self.create_topic_writer(state, &status_topic)?;

    let act = state.aggregator.action_entry(action_name, protocol);
    act.enabler_as_server = true;
    info!("Announced action {action_name}.");
    Ok(())
  }

  /// Release all three sub-services and the stream topics of an announced
  /// action.
  pub fn revoke_action(&self, action_name: &str) -> EnablerResult<()> {
    let handles = {
      let mut state = self.state.lock().unwrap();
      let Some(act) = state.aggregator.action_mut(action_name) else {
        return Err(EnablerError::NotAnnounced(action_name.to_string()));
      };
      if !act.enabler_as_server {
        return Err(EnablerError::NotAnnounced(action_name.to_string()));
      }
      act.enabler_as_server = false;
      let external = act.external_server;

      let mut handles = Vec::new();
      for subtopic in [ActionSubtopic::Goal, ActionSubtopic::Result, ActionSubtopic::Cancel] {
        let service_name = names::action_service_name(action_name, subtopic);
        match Self::revoke_service_nts(&mut state, &service_name) {
          Ok(mut h) => handles.append(&mut h),
          Err(e) => warn!("While revoking action {action_name}: {e}"),
        }
      }
      for topic_name in [
        names::action_feedback_topic(action_name),
        names::action_status_topic(action_name),
      ] {
        state.readers.remove(&topic_name);
        state.announced_topics.remove(&topic_name);
        handles.extend(state.dynamic_endpoints.remove(&topic_name));
      }

      if !external {
        state.aggregator.remove_action(action_name);
      }
      handles
    };
    for handle in handles {
      self.discovery.remove_endpoint(handle);
    }
    info!("Revoked action {action_name}.");
    Ok(())
  }

  /// Send a new goal. Mints the goal id, wraps the goal into the ROS2
  /// envelope and records the correlation entry; any failure erases the
  /// entry again.
  pub fn send_action_goal(
    &self,
    action_name: &str,
    json: &str,
    protocol: Protocol,
  ) -> EnablerResult<GoalId> {
    let topic_name =
      names::action_service_topic(action_name, ActionSubtopic::Goal, ServiceSide::Request, protocol)?;
    let goal_id = GoalId::new_random();
    let goal_msg = json::goal_request_msg(json, goal_id)?;
    let request_id = self.handler.new_request_id();
    self
      .handler
      .store_action_request(action_name, goal_id, request_id, ActionSubtopic::Goal, protocol)?;

    if let Err(e) = self.publish_rpc(&topic_name, &goal_msg, request_id) {
      self.handler.erase_action_uuid(goal_id, ActionEraseReason::Forced);
      return Err(e);
    }
    Ok(goal_id)
  }

  /// Request the result of a goal. Issued automatically once a goal is
  /// accepted; the reply arrives when the goal terminates. A goal whose
  /// result cannot be requested is cancelled right away.
  pub fn send_action_get_result_request(
    &self,
    action_name: &str,
    goal_id: GoalId,
  ) -> EnablerResult<()> {
    let protocol = self.handler.action_protocol(action_name, goal_id);
    if protocol == Protocol::Unknown {
      return Err(EnablerError::NoSuchGoal(goal_id));
    }
    let request_id = self.handler.new_request_id();
    if let Err(e) = self.handler.store_action_request(
      action_name,
      goal_id,
      request_id,
      ActionSubtopic::Result,
      protocol,
    ) {
      self.cancel_failed_result_request(action_name, goal_id, &e);
      return Err(e);
    }
    let topic_name =
      names::action_service_topic(action_name, ActionSubtopic::Result, ServiceSide::Request, protocol)?;
    if let Err(e) =
      self.publish_rpc(&topic_name, &json::result_request_msg(goal_id), request_id)
    {
      self.cancel_failed_result_request(action_name, goal_id, &e);
      return Err(e);
    }
    Ok(())
  }

  fn cancel_failed_result_request(&self, action_name: &str, goal_id: GoalId, e: &EnablerError) {
    warn!("Could not request result of goal {goal_id}: {e}. Canceling the goal.");
    if let Err(cancel_error) = self.cancel_action_goal(action_name, goal_id, 0) {
      error!("Could not cancel goal {goal_id}: {cancel_error}");
    }
  }

  /// Publish a cancel request. A zero goal id and/or zero timestamp widen
  /// the cancellation per the ROS2 policy.
  pub fn cancel_action_goal(
    &self,
    action_name: &str,
    goal_id: GoalId,
    timestamp_nanos: i64,
  ) -> EnablerResult<()> {
    let protocol = if goal_id.is_zero() {
      Protocol::Ros2
    } else {
      match self.handler.action_protocol(action_name, goal_id) {
        Protocol::Unknown => Protocol::Ros2,
        known => known,
      }
    };
    let topic_name =
      names::action_service_topic(action_name, ActionSubtopic::Cancel, ServiceSide::Request, protocol)?;
    let request_id = self.handler.new_request_id();
    self.publish_rpc(
      &topic_name,
      &json::cancel_request_msg(goal_id, timestamp_nanos),
      request_id,
    )
  }

  /// Server side: answer a goal request with the application's verdict.
  pub fn send_action_send_goal_reply(
    &self,
    action_name: &str,
    request_id: u64,
    accepted: bool,
  ) -> EnablerResult<()> {
    let topic_name = names::action_service_topic(
      action_name,
      ActionSubtopic::Goal,
      ServiceSide::Reply,
      Protocol::Ros2,
    )?;
    self.publish_rpc(&topic_name, &json::goal_reply_msg(accepted), request_id)
  }

  /// Server side: answer a cancel request. Only goals currently active are
  /// included in the reply.
  pub fn send_action_cancel_goal_reply(
    &self,
    action_name: &str,
    goal_ids: &[GoalId],
    cancel_code: CancelCode,
    request_id: u64,
  ) -> EnablerResult<()> {
    let canceling = self.handler.filter_active_goals(action_name, goal_ids);
    let topic_name = names::action_service_topic(
      action_name,
      ActionSubtopic::Cancel,
      ServiceSide::Reply,
      Protocol::Ros2,
    )?;
    self.publish_rpc(
      &topic_name,
      &json::cancel_reply_msg(&canceling, cancel_code),
      request_id,
    )
  }

  /// Server side: provide the result of a goal. Delivered immediately when
  /// a get-result request is pending, cached otherwise.
  pub fn send_action_result(
    &self,
    action_name: &str,
    goal_id: GoalId,
    status_code: StatusCode,
    json_result: &str,
  ) -> EnablerResult<()> {
    if self.handler.is_uuid_active(action_name, goal_id).is_none() {
      return Err(EnablerError::NoSuchGoal(goal_id));
    }
    let reply = json::result_reply_msg(status_code, json_result)?;
    self.handler.handle_action_result(action_name, goal_id, reply)
  }

  /// Server side: deliver a result reply for the given request id, then
  /// mark the result as delivered.
  pub fn send_action_get_result_reply(
    &self,
    action_name: &str,
    goal_id: GoalId,
    reply_json: &str,
    request_id: u64,
  ) -> EnablerResult<()> {
    let topic_name = names::action_service_topic(
      action_name,
      ActionSubtopic::Result,
      ServiceSide::Reply,
      Protocol::Ros2,
    )?;
    self.publish_rpc(&topic_name, reply_json, request_id)?;
    self.handler.erase_action_uuid(goal_id, ActionEraseReason::Result);
    Ok(())
  }

  /// Server side: publish feedback for an active goal.
  pub fn send_action_feedback(
    &self,
    action_name: &str,
    json_feedback: &str,
    goal_id: GoalId,
  ) -> EnablerResult<()> {
    if self.handler.is_uuid_active(action_name, goal_id).is_none() {
      return Err(EnablerError::NoSuchGoal(goal_id));
    }
    let msg = json::feedback_msg(json_feedback, goal_id)?;
    self.publish(&names::action_feedback_topic(action_name), &msg)
  }

  /// Server side: publish a status update for an active goal. The status
  /// message carries the original goal-accepted stamp; a terminal status
  /// ends the goal's correlation record.
  pub fn update_action_status(
    &self,
    action_name: &str,
    goal_id: GoalId,
    status_code: StatusCode,
  ) -> EnablerResult<()> {
    let Some(accepted_stamp) = self.handler.is_uuid_active(action_name, goal_id) else {
      return Err(EnablerError::NoSuchGoal(goal_id));
    };
    let msg = json::status_msg(goal_id, status_code, accepted_stamp);
    self.publish(&names::action_status_topic(action_name), &msg)?;
    if status_code.is_terminal() {
      self
        .handler
        .erase_action_uuid(goal_id, ActionEraseReason::FinalStatus);
    }
    Ok(())
  }
}

impl Drop for EnablerParticipant {
  fn drop(&mut self) {
    let handles: Vec<EndpointHandle> = self
      .state
      .lock()
      .map(|mut state| std::mem::take(&mut state.dynamic_endpoints).into_values().collect())
      .unwrap_or_default();
    for handle in handles {
      self.discovery.remove_endpoint(handle);
    }
  }
}
