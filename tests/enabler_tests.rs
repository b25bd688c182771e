//! End-to-end tests: two enabler instances joined by the loopback bus,
//! exercising service round-trips and the full action goal lifecycle.

use std::{
  collections::BTreeMap,
  sync::{Arc, Mutex},
  thread,
  time::Duration,
};

use serde_json::json;

use dds_rpc_enabler::{
  callbacks::CallbackSet,
  config::EnablerConfiguration,
  enabler::DdsEnabler,
  error::EnablerError,
  handler::Handler,
  loopback::LoopbackBus,
  participant::{DiscoveryService, EnablerParticipant},
  payload::PayloadPool,
  rpc::{CancelCode, GoalId, Protocol, StatusCode},
  topic::{ActionInfo, EndpointHandle, ServiceInfo, TopicDescription, TopicInfo},
  types::{DynamicType, JsonTypeSupport},
};

// ---------------------------------------------------------------------------
// test fixture

#[derive(Default)]
struct Record {
  service_requests: Vec<(String, String, u64)>,
  service_replies: Vec<(String, String, u64)>,
  services_discovered: Vec<String>,
  actions_discovered: Vec<String>,
  goal_requests: Vec<(String, String, GoalId)>,
  cancel_requests: Vec<(String, GoalId, i64, u64)>,
  feedback: Vec<(String, String, GoalId)>,
  statuses: Vec<(String, GoalId, StatusCode)>,
  results: Vec<(String, String, GoalId)>,
}

type Shared<T> = Arc<Mutex<T>>;

/// One peer on the loopback bus: the enabler plus everything its callbacks
/// recorded.
struct Peer {
  enabler: Arc<DdsEnabler>,
  record: Shared<Record>,
}

#[derive(Default, Clone)]
struct Catalog {
  topics: BTreeMap<String, TopicInfo>,
  services: BTreeMap<String, ServiceInfo>,
  actions: BTreeMap<String, ActionInfo>,
}

fn plain(type_name: &str) -> TopicInfo {
  TopicInfo {
    type_name: type_name.to_string(),
    serialized_qos: String::new(),
  }
}

fn service_info(request_type: &str, reply_type: &str) -> ServiceInfo {
  ServiceInfo {
    request: plain(request_type),
    reply: plain(reply_type),
  }
}

/// Catalog of the standard Fibonacci test action, with all its topics
/// resolvable through the topic query.
fn fibonacci_catalog(action: &str) -> Catalog {
  let mut catalog = Catalog::default();
  let info = ActionInfo {
    goal: service_info("Fibonacci_SendGoal_Request_", "Fibonacci_SendGoal_Response_"),
    result: service_info("Fibonacci_GetResult_Request_", "Fibonacci_GetResult_Response_"),
    cancel: service_info("CancelGoal_Request_", "CancelGoal_Response_"),
    feedback: plain("Fibonacci_FeedbackMessage_"),
    status: plain("GoalStatusArray_"),
  };
  catalog.topics.insert(
    format!("rq/{action}send_goalRequest"),
    info.goal.request.clone(),
  );
  catalog.topics.insert(
    format!("rr/{action}send_goalReply"),
    info.goal.reply.clone(),
  );
  catalog.topics.insert(
    format!("rq/{action}get_resultRequest"),
    info.result.request.clone(),
  );
  catalog.topics.insert(
    format!("rr/{action}get_resultReply"),
    info.result.reply.clone(),
  );
  catalog.topics.insert(
    format!("rq/{action}cancel_goalRequest"),
    info.cancel.request.clone(),
  );
  catalog.topics.insert(
    format!("rr/{action}cancel_goalReply"),
    info.cancel.reply.clone(),
  );
  catalog
    .topics
    .insert(format!("rt/{action}feedback"), info.feedback.clone());
  catalog
    .topics
    .insert(format!("rt/{action}status"), info.status.clone());
  catalog.actions.insert(action.to_string(), info);
  catalog
}

fn add_catalog_schemas(enabler: &Arc<DdsEnabler>, catalog: &Catalog) {
  let mut type_names: Vec<String> = catalog
    .topics
    .values()
    .map(|info| info.type_name.clone())
    .collect();
  for service in catalog.services.values() {
    type_names.push(service.request.type_name.clone());
    type_names.push(service.reply.type_name.clone());
  }
  type_names.sort();
  type_names.dedup();
  for type_name in type_names {
    let support = JsonTypeSupport::new(&type_name, &format!("struct {type_name} {{}};"), json!({}));
    let type_id = support.identifier();
    enabler.add_schema(Arc::new(support) as DynamicType, type_id);
  }
}

/// Build a peer whose queries answer from `catalog` and whose
/// notifications append to its record. `accept_goals` is the verdict the
/// goal-request callback returns.
fn make_peer(bus: &Arc<LoopbackBus>, name: &str, catalog: Catalog, accept_goals: bool) -> Peer {
  let record: Shared<Record> = Arc::default();

  let mut callbacks = CallbackSet::default();

  let topics = catalog.topics.clone();
  callbacks.dds.topic_query = Some(Box::new(move |topic_name| topics.get(topic_name).cloned()));

  let services = catalog.services.clone();
  callbacks.service.service_query =
    Some(Box::new(move |service_name| services.get(service_name).cloned()));

  let actions = catalog.actions.clone();
  callbacks.action.action_query =
    Some(Box::new(move |action_name| actions.get(action_name).cloned()));

  let r = Arc::clone(&record);
  callbacks.service.service_notification = Some(Box::new(move |service_name, _info| {
    r.lock().unwrap().services_discovered.push(service_name.to_string());
  }));

  let r = Arc::clone(&record);
  callbacks.action.action_notification = Some(Box::new(move |action_name, _info| {
    r.lock().unwrap().actions_discovered.push(action_name.to_string());
  }));

  let r = Arc::clone(&record);
  callbacks.service.service_request_notification =
    Some(Box::new(move |service_name, json, request_id, _publish_time| {
      r.lock()
        .unwrap()
        .service_requests
        .push((service_name.to_string(), json.to_string(), request_id));
    }));

  let r = Arc::clone(&record);
  callbacks.service.service_reply_notification =
    Some(Box::new(move |service_name, json, request_id, _publish_time| {
      r.lock()
        .unwrap()
        .service_replies
        .push((service_name.to_string(), json.to_string(), request_id));
    }));

  let r = Arc::clone(&record);
  callbacks.action.action_goal_request_notification =
    Some(Box::new(move |action_name, json, goal_id, _publish_time| {
      r.lock()
        .unwrap()
        .goal_requests
        .push((action_name.to_string(), json.to_string(), *goal_id));
      accept_goals
    }));

  let r = Arc::clone(&record);
  callbacks.action.action_cancel_request_notification = Some(Box::new(
    move |action_name, goal_id, timestamp, request_id, _publish_time| {
      r.lock().unwrap().cancel_requests.push((
        action_name.to_string(),
        *goal_id,
        timestamp,
        request_id,
      ));
    },
  ));

  let r = Arc::clone(&record);
  callbacks.action.action_feedback_notification =
    Some(Box::new(move |action_name, json, goal_id, _publish_time| {
      r.lock()
        .unwrap()
        .feedback
        .push((action_name.to_string(), json.to_string(), *goal_id));
    }));

  let r = Arc::clone(&record);
  callbacks.action.action_status_notification = Some(Box::new(
    move |action_name, goal_id, status_code, _message, _publish_time| {
      r.lock()
        .unwrap()
        .statuses
        .push((action_name.to_string(), *goal_id, status_code));
    },
  ));

  let r = Arc::clone(&record);
  callbacks.action.action_result_notification =
    Some(Box::new(move |action_name, json, goal_id, _publish_time| {
      r.lock()
        .unwrap()
        .results
        .push((action_name.to_string(), json.to_string(), *goal_id));
    }));

  let enabler = DdsEnabler::new(
    EnablerConfiguration::default(),
    callbacks,
    bus.clone(),
    None,
  );
  add_catalog_schemas(&enabler, &catalog);
  bus.join(name, &enabler);

  Peer { enabler, record }
}

/// Let the loopback discovery thread catch up.
fn settle() {
  thread::sleep(Duration::from_millis(100));
}

// ---------------------------------------------------------------------------
// services

#[test]
fn service_round_trip() {
  let bus = LoopbackBus::new();

  let mut catalog = Catalog::default();
  catalog.services.insert(
    "add_two_ints".to_string(),
    service_info("AddTwoInts_Request_", "AddTwoInts_Response_"),
  );
  catalog.topics.insert(
    "rq/add_two_intsRequest".to_string(),
    plain("AddTwoInts_Request_"),
  );
  catalog.topics.insert(
    "rr/add_two_intsReply".to_string(),
    plain("AddTwoInts_Response_"),
  );

  let server = make_peer(&bus, "server", catalog.clone(), true);
  let client = make_peer(&bus, "client", catalog, true);

  server
    .enabler
    .announce_service("add_two_ints", Protocol::Ros2)
    .unwrap();
  settle();

  let request_id = client
    .enabler
    .send_service_request("add_two_ints", "{\"a\":1,\"b\":2}")
    .unwrap();

  // The request reached the server exactly once.
  let (server_request_id, a, b) = {
    let record = server.record.lock().unwrap();
    assert_eq!(record.service_requests.len(), 1);
    let (service, json, id) = record.service_requests[0].clone();
    assert_eq!(service, "add_two_ints");
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    (id, value["a"].as_i64().unwrap(), value["b"].as_i64().unwrap())
  };
  assert_eq!((a, b), (1, 2));

  server
    .enabler
    .send_service_reply(
      "add_two_ints",
      &json!({"sum": a + b}).to_string(),
      server_request_id,
    )
    .unwrap();

  let record = client.record.lock().unwrap();
  assert_eq!(record.service_replies.len(), 1);
  let (service, json, reply_request_id) = record.service_replies[0].clone();
  assert_eq!(service, "add_two_ints");
  assert_eq!(reply_request_id, request_id, "reply correlates to the request");
  let value: serde_json::Value = serde_json::from_str(&json).unwrap();
  assert_eq!(value["sum"], 3);
}

#[test]
fn request_ids_are_strictly_increasing() {
  let bus = LoopbackBus::new();

  let mut catalog = Catalog::default();
  catalog
    .services
    .insert("echo".to_string(), service_info("Echo_Request_", "Echo_Response_"));
  catalog
    .topics
    .insert("rq/echoRequest".to_string(), plain("Echo_Request_"));
  catalog
    .topics
    .insert("rr/echoReply".to_string(), plain("Echo_Response_"));

  let server = make_peer(&bus, "server", catalog.clone(), true);
  let client = make_peer(&bus, "client", catalog, true);
  server.enabler.announce_service("echo", Protocol::Ros2).unwrap();
  settle();

  let mut previous = 0;
  for n in 0..4 {
    let id = client
      .enabler
      .send_service_request("echo", &json!({"n": n}).to_string())
      .unwrap();
    assert!(id > previous, "request ids must be strictly increasing");
    previous = id;
  }
}

#[test]
fn announce_and_revoke_invariants() {
  let bus = LoopbackBus::new();

  let mut catalog = Catalog::default();
  catalog
    .services
    .insert("solo".to_string(), service_info("Solo_Request_", "Solo_Response_"));
  let server = make_peer(&bus, "server", catalog, true);

  server.enabler.announce_service("solo", Protocol::Ros2).unwrap();
  assert!(matches!(
    server.enabler.announce_service("solo", Protocol::Ros2),
    Err(EnablerError::AlreadyAnnounced(_))
  ));

  server.enabler.revoke_service("solo").unwrap();
  assert!(matches!(
    server.enabler.revoke_service("solo"),
    Err(EnablerError::NotAnnounced(_))
  ));

  // No external server existed, so the record is gone and a reply can no
  // longer resolve the protocol.
  assert!(matches!(
    server.enabler.send_service_reply("solo", "{}", 1),
    Err(EnablerError::UnknownRpcProtocol(_))
  ));
}

// ---------------------------------------------------------------------------
// actions

#[test]
fn action_happy_path() {
  let bus = LoopbackBus::new();
  let action = "fibonacci/_action/";
  let catalog = fibonacci_catalog(action);

  let server = make_peer(&bus, "server", catalog.clone(), true);
  let client = make_peer(&bus, "client", catalog, true);

  server.enabler.announce_action(action).unwrap();
  settle();

  let goal_id = client
    .enabler
    .send_action_goal(action, "{\"order\":5}")
    .unwrap();

  // Goal request reached the server and was accepted; the client's
  // get-result request followed automatically.
  {
    let record = server.record.lock().unwrap();
    assert_eq!(record.goal_requests.len(), 1);
    assert_eq!(record.goal_requests[0].2, goal_id);
    let value: serde_json::Value = serde_json::from_str(&record.goal_requests[0].1).unwrap();
    assert_eq!(value["order"], 5);
  }

  // Feedback with partial sequences.
  for step in [json!([0]), json!([0, 1]), json!([0, 1, 1]), json!([0, 1, 1, 2])] {
    server
      .enabler
      .send_action_feedback(action, &json!({ "partial_sequence": step }).to_string(), goal_id)
      .unwrap();
  }

  server
    .enabler
    .send_action_result(action, goal_id, StatusCode::Succeeded, "{\"sequence\":[0,1,1,2,3]}")
    .unwrap();
  server
    .enabler
    .update_action_status(action, goal_id, StatusCode::Succeeded)
    .unwrap();

  {
    let record = client.record.lock().unwrap();
    assert_eq!(record.feedback.len(), 4, "all feedback items delivered");
    assert!(record.feedback.iter().all(|(_, _, id)| *id == goal_id));

    assert_eq!(record.results.len(), 1, "result delivered exactly once");
    let value: serde_json::Value = serde_json::from_str(&record.results[0].1).unwrap();
    assert_eq!(value["sequence"], json!([0, 1, 1, 2, 3]));

    assert!(record
      .statuses
      .iter()
      .any(|(_, id, status)| *id == goal_id && *status == StatusCode::Succeeded));
  }

  // Both sides erased the correlation record: result + final status seen.
  assert!(client.enabler.handler().is_uuid_active(action, goal_id).is_none());
  assert!(server.enabler.handler().is_uuid_active(action, goal_id).is_none());
}

#[test]
fn rejected_goal_is_forgotten() {
  let bus = LoopbackBus::new();
  let action = "fibonacci/_action/";
  let catalog = fibonacci_catalog(action);

  let server = make_peer(&bus, "server", catalog.clone(), false); // rejects
  let client = make_peer(&bus, "client", catalog, true);

  server.enabler.announce_action(action).unwrap();
  settle();

  let goal_id = client
    .enabler
    .send_action_goal(action, "{\"order\":3}")
    .unwrap();

  assert_eq!(server.record.lock().unwrap().goal_requests.len(), 1);
  // Rejected: both sides dropped the correlation record.
  assert!(client.enabler.handler().is_uuid_active(action, goal_id).is_none());
  assert!(server.enabler.handler().is_uuid_active(action, goal_id).is_none());
}

#[test]
fn cancel_goals_accepted_before_timestamp() {
  let bus = LoopbackBus::new();
  let action = "move/_action/";
  let catalog = fibonacci_catalog(action);

  let server = make_peer(&bus, "server", catalog.clone(), true);
  let client = make_peer(&bus, "client", catalog, true);

  server.enabler.announce_action(action).unwrap();
  settle();

  let mut goals = Vec::new();
  for order in 1..=3 {
    goals.push(
      client
        .enabler
        .send_action_goal(action, &json!({ "order": order }).to_string())
        .unwrap(),
    );
    thread::sleep(Duration::from_millis(5)); // distinct accepted stamps
  }
  let (g1, g2, g3) = (goals[0], goals[1], goals[2]);

  // Cancel everything accepted at or before g2's stamp.
  let t2 = server
    .enabler
    .handler()
    .is_uuid_active(action, g2)
    .expect("goal 2 active on server");
  client
    .enabler
    .cancel_action_goal(action, GoalId::ZERO, t2.to_nanos())
    .unwrap();

  // Server application: select the active goals accepted at or before the
  // given timestamp and confirm those.
  let (cancel_goal_id, timestamp, request_id) = {
    let record = server.record.lock().unwrap();
    assert_eq!(record.cancel_requests.len(), 1);
    let (_, goal_id, timestamp, request_id) = record.cancel_requests[0];
    (goal_id, timestamp, request_id)
  };
  assert!(cancel_goal_id.is_zero());

  let candidates: Vec<GoalId> = [g1, g2, g3]
    .into_iter()
    .filter(|g| {
      server
        .enabler
        .handler()
        .is_uuid_active(action, *g)
        .is_some_and(|stamp| stamp.to_nanos() <= timestamp)
    })
    .collect();
  server
    .enabler
    .send_action_cancel_goal_reply(action, &candidates, CancelCode::None, request_id)
    .unwrap();

  let record = client.record.lock().unwrap();
  let canceling: Vec<GoalId> = record
    .statuses
    .iter()
    .filter(|(_, _, status)| *status == StatusCode::Canceling)
    .map(|(_, id, _)| *id)
    .collect();
  assert_eq!(canceling.len(), 2, "exactly the first two goals cancel");
  assert!(canceling.contains(&g1));
  assert!(canceling.contains(&g2));
  assert!(!canceling.contains(&g3));
  // The third goal is still live on both sides.
  assert!(client.enabler.handler().is_uuid_active(action, g3).is_some());
  assert!(server.enabler.handler().is_uuid_active(action, g3).is_some());
}

#[test]
fn result_cached_until_get_result_request() {
  let bus = LoopbackBus::new();
  let action = "slow/_action/";
  let catalog = fibonacci_catalog(action);

  let server = make_peer(&bus, "server", catalog.clone(), true);

  // A bare client without the façade wiring: it does not auto-request the
  // result on acceptance, so the server's result has to wait in the cache.
  let client_record: Shared<Record> = Arc::default();
  let client_callbacks = {
    let mut callbacks = CallbackSet::default();
    let topics = catalog.topics.clone();
    callbacks.dds.topic_query = Some(Box::new(move |name| topics.get(name).cloned()));
    let r = Arc::clone(&client_record);
    callbacks.action.action_result_notification =
      Some(Box::new(move |action_name, json, goal_id, _publish_time| {
        r.lock()
          .unwrap()
          .results
          .push((action_name.to_string(), json.to_string(), *goal_id));
      }));
    Arc::new(callbacks)
  };
  let client_pool = PayloadPool::new();
  let client_handler = Handler::new(client_pool, Arc::clone(&client_callbacks), None);
  let client_participant = EnablerParticipant::new(
    EnablerConfiguration::default(),
    Arc::clone(&client_handler),
    bus.clone(),
    client_callbacks,
  );
  for (_, info) in catalog.topics.iter() {
    let support = JsonTypeSupport::new(&info.type_name, "struct T {};", json!({}));
    let id = support.identifier();
    client_handler.add_schema(Arc::new(support) as DynamicType, id);
  }
  bus.attach("bare-client", &client_participant, &client_handler);

  server.enabler.announce_action(action).unwrap();
  settle();

  let goal_id = client_participant
    .send_action_goal(action, "{\"order\":2}", Protocol::Ros2)
    .unwrap();
  assert_eq!(server.record.lock().unwrap().goal_requests.len(), 1);

  // The server finishes before anyone asked for the result: cached.
  server
    .enabler
    .send_action_result(action, goal_id, StatusCode::Succeeded, "{\"sequence\":[0,1]}")
    .unwrap();
  assert!(client_record.lock().unwrap().results.is_empty());
  assert!(server.enabler.handler().is_uuid_active(action, goal_id).is_some());

  // The late get-result request is answered immediately from the cache.
  client_participant
    .send_action_get_result_request(action, goal_id)
    .unwrap();

  let record = client_record.lock().unwrap();
  assert_eq!(record.results.len(), 1);
  assert_eq!(record.results[0].2, goal_id);
  let value: serde_json::Value = serde_json::from_str(&record.results[0].1).unwrap();
  assert_eq!(value["sequence"], json!([0, 1]));
}

// ---------------------------------------------------------------------------
// failure paths

struct SilentDiscovery {
  added: Mutex<Vec<String>>,
  removed: Mutex<Vec<u64>>,
}

impl SilentDiscovery {
  fn new() -> Arc<SilentDiscovery> {
    Arc::new(SilentDiscovery {
      added: Mutex::new(Vec::new()),
      removed: Mutex::new(Vec::new()),
    })
  }
}

impl DiscoveryService for SilentDiscovery {
  fn add_endpoint(&self, topic: &TopicDescription) -> EndpointHandle {
    let mut added = self.added.lock().unwrap();
    added.push(topic.name.clone());
    EndpointHandle(added.len() as u64)
  }

  fn remove_endpoint(&self, handle: EndpointHandle) -> bool {
    self.removed.lock().unwrap().push(handle.0);
    true
  }
}

#[test]
fn publish_fails_when_no_reader_appears() {
  let discovery = SilentDiscovery::new();

  let mut callbacks = CallbackSet::default();
  callbacks.dds.topic_query = Some(Box::new(|_| Some(plain("Lost_Type_"))));

  let enabler = DdsEnabler::new(
    EnablerConfiguration::new().reader_wait_timeout(Duration::from_millis(50)),
    callbacks,
    discovery.clone(),
    None,
  );
  let support = JsonTypeSupport::new("Lost_Type_", "struct T {};", json!({}));
  let id = support.identifier();
  enabler.add_schema(Arc::new(support) as DynamicType, id);

  assert!(matches!(
    enabler.publish("rt/nowhere", "{}"),
    Err(EnablerError::ReaderCreationFailed(_))
  ));
  // No partial publish, no leaked payload.
  assert_eq!(enabler.payload_pool().outstanding(), 0);
  assert_eq!(discovery.added.lock().unwrap().len(), 1);

  // The endpoint is still removable: dropping the enabler releases it.
  drop(enabler);
  assert_eq!(discovery.removed.lock().unwrap().as_slice(), &[1]);
}

#[test]
fn action_announce_is_ros2_only() {
  let bus = LoopbackBus::new();
  let peer = make_peer(&bus, "solo", fibonacci_catalog("a/_action/"), true);
  assert!(matches!(
    peer
      .enabler
      .announce_action_with_protocol("a/_action/", Protocol::Dds),
    Err(EnablerError::UnsupportedProtocol(Protocol::Dds))
  ));
}

#[test]
fn operations_on_unknown_goals_fail() {
  let bus = LoopbackBus::new();
  let peer = make_peer(&bus, "solo", fibonacci_catalog("b/_action/"), true);
  let ghost = GoalId::new_random();
  assert!(matches!(
    peer
      .enabler
      .send_action_result("b/_action/", ghost, StatusCode::Succeeded, "{}"),
    Err(EnablerError::NoSuchGoal(_))
  ));
  assert!(matches!(
    peer.enabler.send_action_feedback("b/_action/", "{}", ghost),
    Err(EnablerError::NoSuchGoal(_))
  ));
  assert!(matches!(
    peer
      .enabler
      .update_action_status("b/_action/", ghost, StatusCode::Executing),
    Err(EnablerError::NoSuchGoal(_))
  ));
}
