use serde::{Deserialize, Serialize};

/// Description of one bus topic: name, type, and opaque serialized QoS.
///
/// QoS is carried as text the application and transport agree on; an empty
/// string means transport defaults.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TopicDescription {
  pub name: String,
  pub type_name: String,
  pub serialized_qos: String,
}

impl TopicDescription {
  pub fn new(name: &str, type_name: &str, serialized_qos: &str) -> TopicDescription {
    TopicDescription {
      name: name.to_string(),
      type_name: type_name.to_string(),
      serialized_qos: serialized_qos.to_string(),
    }
  }

  pub fn info(&self) -> TopicInfo {
    TopicInfo {
      type_name: self.type_name.clone(),
      serialized_qos: self.serialized_qos.clone(),
    }
  }
}

/// Type and QoS of a topic, as exchanged with the application in
/// notifications and queries.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicInfo {
  pub type_name: String,
  pub serialized_qos: String,
}

/// Request/reply topic pair of a service, as exchanged with the application.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInfo {
  pub request: TopicInfo,
  pub reply: TopicInfo,
}

/// Full topic set of an action, as exchanged with the application.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionInfo {
  pub goal: ServiceInfo,
  pub result: ServiceInfo,
  pub cancel: ServiceInfo,
  pub feedback: TopicInfo,
  pub status: TopicInfo,
}

/// A fully resolved service: its name and both topics.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RpcTopic {
  pub name: String,
  pub request: TopicDescription,
  pub reply: TopicDescription,
}

impl RpcTopic {
  pub fn info(&self) -> ServiceInfo {
    ServiceInfo {
      request: self.request.info(),
      reply: self.reply.info(),
    }
  }
}

/// A fully resolved action: three services plus feedback and status topics.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RpcAction {
  pub name: String,
  pub goal: RpcTopic,
  pub result: RpcTopic,
  pub cancel: RpcTopic,
  pub feedback: TopicDescription,
  pub status: TopicDescription,
}

impl RpcAction {
  pub fn info(&self) -> ActionInfo {
    ActionInfo {
      goal: self.goal.info(),
      result: self.result.info(),
      cancel: self.cancel.info(),
      feedback: self.feedback.info(),
      status: self.status.info(),
    }
  }
}

/// Opaque token identifying a dynamic endpoint in the transport's discovery
/// database. Required to remove the endpoint again on revoke.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EndpointHandle(pub u64);
