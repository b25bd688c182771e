//! Assembly of partial topic discoveries into complete services and actions.
//!
//! The transport reports topics one at a time and in no particular order; a
//! service becomes visible to the application only once both of its topics
//! are known, an action only once its three services and both stream topics
//! are. Each entity is emitted exactly once, on the transition to fully
//! discovered.

use std::collections::BTreeMap;

#[allow(unused_imports)]
use log::{debug, error, info, warn};

use crate::{
  names::RpcInfo,
  rpc::{ActionSubtopic, Protocol, RpcRole, ServiceSide},
  topic::{EndpointHandle, RpcAction, RpcTopic, TopicDescription},
};

/// Discovery state of one service.
#[derive(Debug, Clone)]
pub struct ServiceDiscovered {
  pub service_name: String,
  pub protocol: Protocol,
  request_topic: Option<TopicDescription>,
  reply_topic: Option<TopicDescription>,
  pub fully_discovered: bool,
  /// This enabler announced itself as the server of this service.
  pub enabler_as_server: bool,
  /// Some external participant serves this service. Independent of
  /// `enabler_as_server`.
  pub external_server: bool,
  /// Endpoint simulated on announce; needed to revoke it again.
  pub endpoint_request: Option<EndpointHandle>,
}

impl ServiceDiscovered {
  pub fn new(service_name: &str, protocol: Protocol) -> ServiceDiscovered {
    ServiceDiscovered {
      service_name: service_name.to_string(),
      protocol,
      request_topic: None,
      reply_topic: None,
      fully_discovered: false,
      enabler_as_server: false,
      external_server: false,
      endpoint_request: None,
    }
  }

  /// Record one side. Returns true exactly when the service transitions to
  /// fully discovered; duplicate side discoveries are no-ops.
  pub fn add_topic(&mut self, topic: TopicDescription, side: ServiceSide) -> bool {
    let slot = match side {
      ServiceSide::Request => &mut self.request_topic,
      ServiceSide::Reply => &mut self.reply_topic,
    };
    if slot.is_some() {
      return false;
    }
    *slot = Some(topic);

    if self.request_topic.is_some() && self.reply_topic.is_some() {
      if self.service_name.is_empty() {
        return false;
      }
      self.fully_discovered = true;
      return true;
    }
    false
  }

  pub fn remove_topic(&mut self, side: ServiceSide) {
    match side {
      ServiceSide::Request => self.request_topic = None,
      ServiceSide::Reply => self.reply_topic = None,
    }
    self.fully_discovered = false;
  }

  pub fn topic(&self, side: ServiceSide) -> Option<&TopicDescription> {
    match side {
      ServiceSide::Request => self.request_topic.as_ref(),
      ServiceSide::Reply => self.reply_topic.as_ref(),
    }
  }

  /// The complete request/reply pair, available once fully discovered.
  pub fn rpc_topic(&self) -> Option<RpcTopic> {
    if !self.fully_discovered {
      return None;
    }
    Some(RpcTopic {
      name: self.service_name.clone(),
      request: self.request_topic.clone()?,
      reply: self.reply_topic.clone()?,
    })
  }
}

/// Discovery state of one action. The three constituent services are
/// referenced by name into the owning services map; a missing entry reads
/// as "not discovered", exactly like an expired weak reference.
#[derive(Debug, Clone)]
pub struct ActionDiscovered {
  pub action_name: String,
  pub protocol: Protocol,
  goal: Option<String>,
  result: Option<String>,
  cancel: Option<String>,
  feedback: Option<TopicDescription>,
  status: Option<TopicDescription>,
  pub fully_discovered: bool,
  pub enabler_as_server: bool,
  pub external_server: bool,
}

impl ActionDiscovered {
  pub fn new(action_name: &str, protocol: Protocol) -> ActionDiscovered {
    ActionDiscovered {
      action_name: action_name.to_string(),
      protocol,
      goal: None,
      result: None,
      cancel: None,
      feedback: None,
      status: None,
      fully_discovered: false,
      enabler_as_server: false,
      external_server: false,
    }
  }

  pub fn set_service(&mut self, subtopic: ActionSubtopic, service_name: &str) {
    let slot = match subtopic {
      ActionSubtopic::Goal => &mut self.goal,
      ActionSubtopic::Result => &mut self.result,
      ActionSubtopic::Cancel => &mut self.cancel,
    };
    *slot = Some(service_name.to_string());
  }

  pub fn set_feedback_topic(&mut self, topic: TopicDescription) {
    self.feedback = Some(topic);
  }

  pub fn set_status_topic(&mut self, topic: TopicDescription) {
    self.status = Some(topic);
  }

  pub fn feedback_topic(&self) -> Option<&TopicDescription> {
    self.feedback.as_ref()
  }

  pub fn status_topic(&self) -> Option<&TopicDescription> {
    self.status.as_ref()
  }

  pub fn service_name(&self, subtopic: ActionSubtopic) -> Option<&str> {
    match subtopic {
      ActionSubtopic::Goal => self.goal.as_deref(),
      ActionSubtopic::Result => self.result.as_deref(),
      ActionSubtopic::Cancel => self.cancel.as_deref(),
    }
  }

  fn resolve<'a>(
    &self,
    subtopic: ActionSubtopic,
    services: &'a BTreeMap<String, ServiceDiscovered>,
  ) -> Option<&'a ServiceDiscovered> {
    services.get(self.service_name(subtopic)?)
  }

  /// Recompute `fully_discovered` against the current services map.
  pub fn check_fully_discovered(
    &mut self,
    services: &BTreeMap<String, ServiceDiscovered>,
  ) -> bool {
    let all_services_full = [ActionSubtopic::Goal, ActionSubtopic::Result, ActionSubtopic::Cancel]
      .into_iter()
      .all(|s| self.resolve(s, services).is_some_and(|svc| svc.fully_discovered));
    self.fully_discovered =
      all_services_full && self.feedback.is_some() && self.status.is_some();
    self.fully_discovered
  }

  /// The complete action topic set, available once fully discovered.
  pub fn rpc_action(
    &self,
    services: &BTreeMap<String, ServiceDiscovered>,
  ) -> Option<RpcAction> {
    if !self.fully_discovered {
      return None;
    }
    Some(RpcAction {
      name: self.action_name.clone(),
      goal: self.resolve(ActionSubtopic::Goal, services)?.rpc_topic()?,
      result: self.resolve(ActionSubtopic::Result, services)?.rpc_topic()?,
      cancel: self.resolve(ActionSubtopic::Cancel, services)?.rpc_topic()?,
      feedback: self.feedback.clone()?,
      status: self.status.clone()?,
    })
  }
}

/// A fully assembled entity, to be reported to the handler.
#[derive(Debug, Clone)]
pub enum DiscoveryEvent {
  Service(RpcTopic),
  Action(RpcAction),
}

/// Accumulates topic discoveries into services and actions.
#[derive(Default)]
pub struct DiscoveryAggregator {
  services: BTreeMap<String, ServiceDiscovered>,
  actions: BTreeMap<String, ActionDiscovered>,
}

impl DiscoveryAggregator {
  pub fn new() -> DiscoveryAggregator {
    DiscoveryAggregator::default()
  }

  pub fn service(&self, service_name: &str) -> Option<&ServiceDiscovered> {
    self.services.get(service_name)
  }

  pub fn service_mut(&mut self, service_name: &str) -> Option<&mut ServiceDiscovered> {
    self.services.get_mut(service_name)
  }

  /// Get or create the service entry.
  pub fn service_entry(
    &mut self,
    service_name: &str,
    protocol: Protocol,
  ) -> &mut ServiceDiscovered {
    self
      .services
      .entry(service_name.to_string())
      .or_insert_with(|| ServiceDiscovered::new(service_name, protocol))
  }

  pub fn remove_service(&mut self, service_name: &str) {
    self.services.remove(service_name);
    // every action referencing this service falls back to incomplete
    for action in self.actions.values_mut() {
      action.check_fully_discovered(&self.services);
    }
  }

  pub fn action(&self, action_name: &str) -> Option<&ActionDiscovered> {
    self.actions.get(action_name)
  }

  pub fn action_mut(&mut self, action_name: &str) -> Option<&mut ActionDiscovered> {
    self.actions.get_mut(action_name)
  }

  pub fn action_entry(
    &mut self,
    action_name: &str,
    protocol: Protocol,
  ) -> &mut ActionDiscovered {
    self
      .actions
      .entry(action_name.to_string())
      .or_insert_with(|| ActionDiscovered::new(action_name, protocol))
  }

  pub fn remove_action(&mut self, action_name: &str) {
    self.actions.remove(action_name);
  }

  pub fn services(&self) -> impl Iterator<Item = &ServiceDiscovered> {
    self.services.values()
  }

  pub fn services_map(&self) -> &BTreeMap<String, ServiceDiscovered> {
    &self.services
  }

  /// Feed one topic discovery. `locally_announced` marks topics this
  /// enabler simulated itself; anything else implies an external
  /// participant. Returns the entities completed by this discovery.
  pub fn topic_discovered(
    &mut self,
    rpc_info: &RpcInfo,
    topic: &TopicDescription,
    locally_announced: bool,
  ) -> Vec<DiscoveryEvent> {
    let mut events = Vec::new();

    match rpc_info.role {
      RpcRole::Service { side } | RpcRole::Action { side, .. } => {
        let Some(service_name) = rpc_info.service_name.as_deref() else {
          return events;
        };
        let service = self.service_entry(service_name, rpc_info.protocol);
        if !locally_announced {
          service.external_server = true;
        }
        let completed = service.add_topic(topic.clone(), side);
        if completed {
          info!("Service {service_name} fully discovered.");
          if let Some(rpc_topic) = service.rpc_topic() {
            events.push(DiscoveryEvent::Service(rpc_topic));
          }
        }

        if let RpcRole::Action { subtopic, .. } = rpc_info.role {
          let Some(action_name) = rpc_info.action_name.clone() else {
            return events;
          };
          let service_name = service_name.to_string();
          let action = self.action_entry(&action_name, rpc_info.protocol);
          action.set_service(subtopic, &service_name);
          if !locally_announced {
            action.external_server = true;
          }
          self.refresh_action(&action_name, &mut events);
        }
      }

      RpcRole::ActionFeedback | RpcRole::ActionStatus => {
        let Some(action_name) = rpc_info.action_name.clone() else {
          return events;
        };
        let action = self.action_entry(&action_name, rpc_info.protocol);
        match rpc_info.role {
          RpcRole::ActionFeedback => action.set_feedback_topic(topic.clone()),
          _ => action.set_status_topic(topic.clone()),
        }
        if !locally_announced {
          action.external_server = true;
        }
        self.refresh_action(&action_name, &mut events);
      }

      RpcRole::None => {}
    }

    events
  }

  fn refresh_action(&mut self, action_name: &str, events: &mut Vec<DiscoveryEvent>) {
    let services = &self.services;
    if let Some(action) = self.actions.get_mut(action_name) {
      let was_full = action.fully_discovered;
      if action.check_fully_discovered(services) && !was_full {
        info!("Action {action_name} fully discovered.");
        if let Some(rpc_action) = action.rpc_action(services) {
          events.push(DiscoveryEvent::Action(rpc_action));
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::names;

  fn topic(name: &str, type_name: &str) -> TopicDescription {
    TopicDescription::new(name, type_name, "")
  }

  fn feed(
    aggregator: &mut DiscoveryAggregator,
    topic_name: &str,
    type_name: &str,
  ) -> Vec<DiscoveryEvent> {
    let info = RpcInfo::classify(topic_name);
    aggregator.topic_discovered(&info, &topic(topic_name, type_name), false)
  }

  #[test]
  fn service_emitted_once_on_completion() {
    let mut aggregator = DiscoveryAggregator::new();

    assert!(feed(&mut aggregator, "rq/add_two_intsRequest", "Req_").is_empty());
    // duplicate side: no change
    assert!(feed(&mut aggregator, "rq/add_two_intsRequest", "Req_").is_empty());

    let events = feed(&mut aggregator, "rr/add_two_intsReply", "Rep_");
    assert_eq!(events.len(), 1);
    match &events[0] {
      DiscoveryEvent::Service(rpc_topic) => {
        assert_eq!(rpc_topic.name, "add_two_ints");
        assert_eq!(rpc_topic.request.type_name, "Req_");
        assert_eq!(rpc_topic.reply.type_name, "Rep_");
      }
      other => panic!("expected service event, got {other:?}"),
    }
    assert!(aggregator.service("add_two_ints").unwrap().external_server);

    // re-discovery does not re-emit
    assert!(feed(&mut aggregator, "rr/add_two_intsReply", "Rep_").is_empty());
  }

  #[test]
  fn action_emitted_when_all_parts_present() {
    let mut aggregator = DiscoveryAggregator::new();
    let action = "fibonacci/_action/";

    let mut all_events = Vec::new();
    for (sub, req_type, rep_type) in [
      ("send_goal", "SendGoal_Request_", "SendGoal_Response_"),
      ("get_result", "GetResult_Request_", "GetResult_Response_"),
      ("cancel_goal", "CancelGoal_Request_", "CancelGoal_Response_"),
    ] {
      all_events.extend(feed(
        &mut aggregator,
        &format!("rq/{action}{sub}Request"),
        req_type,
      ));
      all_events.extend(feed(
        &mut aggregator,
        &format!("rr/{action}{sub}Reply"),
        rep_type,
      ));
    }
    all_events.extend(feed(
      &mut aggregator,
      &names::action_feedback_topic(action),
      "FeedbackMessage_",
    ));
    // three services plus feedback, still no action event
    assert_eq!(
      all_events
        .iter()
        .filter(|e| matches!(e, DiscoveryEvent::Action(_)))
        .count(),
      0
    );

    let events = feed(
      &mut aggregator,
      &names::action_status_topic(action),
      "GoalStatusArray_",
    );
    assert_eq!(events.len(), 1);
    match &events[0] {
      DiscoveryEvent::Action(rpc_action) => {
        assert_eq!(rpc_action.name, action);
        assert_eq!(rpc_action.goal.name, format!("{action}send_goal"));
        assert_eq!(rpc_action.status.type_name, "GoalStatusArray_");
      }
      other => panic!("expected action event, got {other:?}"),
    }
  }

  #[test]
  fn removing_a_service_degrades_the_action() {
    let mut aggregator = DiscoveryAggregator::new();
    let action = "move/_action/";
    for sub in ["send_goal", "get_result", "cancel_goal"] {
      feed(&mut aggregator, &format!("rq/{action}{sub}Request"), "Q");
      feed(&mut aggregator, &format!("rr/{action}{sub}Reply"), "R");
    }
    feed(&mut aggregator, &names::action_feedback_topic(action), "F");
    feed(&mut aggregator, &names::action_status_topic(action), "S");
    assert!(aggregator.action(action).unwrap().fully_discovered);

    aggregator.remove_service(&format!("{action}get_result"));
    assert!(!aggregator.action(action).unwrap().fully_discovered);
  }

  #[test]
  fn locally_announced_topics_do_not_mark_external() {
    let mut aggregator = DiscoveryAggregator::new();
    let info = RpcInfo::classify("rq/localRequest");
    aggregator.topic_discovered(&info, &topic("rq/localRequest", "T"), true);
    assert!(!aggregator.service("local").unwrap().external_server);
  }
}
