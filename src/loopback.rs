//! In-process bus joining enabler instances directly, with no network
//! transport underneath.
//!
//! Topics announced by any participant are discovered by all of them, and a
//! sample injected into one participant's internal reader is delivered to
//! every other participant's handler. Request identities are translated the
//! way a real RPC-aware transport would: the id a server's handler mints for
//! an inbound request is mapped back to the requester's own id when the
//! reply comes through.
//!
//! Intended for tests and demos; wire-level concerns (QoS, durability,
//! fragmentation) do not exist here.

use std::{
  collections::BTreeMap,
  sync::{mpsc, Arc, Mutex, Weak},
  thread,
};

#[allow(unused_imports)]
use log::{debug, error, info, warn};

use crate::{
  enabler::DdsEnabler,
  handler::Handler,
  names::RpcInfo,
  participant::{DiscoveryService, EnablerParticipant},
  payload::PayloadData,
  rpc::ServiceSide,
  topic::{EndpointHandle, TopicDescription},
};

struct BusParticipant {
  name: String,
  participant: Arc<EnablerParticipant>,
  handler: Arc<Handler>,
}

struct PendingRequest {
  origin: usize,
  origin_request_id: Option<u64>,
}

struct DeferredReply {
  responder: usize,
  topic: TopicDescription,
  data: PayloadData,
}

#[derive(Default)]
struct BusState {
  participants: Vec<BusParticipant>,
  topics: BTreeMap<String, TopicDescription>,
  endpoints: BTreeMap<u64, String>,
  next_endpoint: u64,
  /// (responder index, responder-local request id) → how to reach the
  /// requester again.
  pending_requests: BTreeMap<(usize, u64), PendingRequest>,
  /// Replies observed before their pending entry was recorded; flushed as
  /// soon as the entry appears.
  deferred_replies: Vec<DeferredReply>,
}

pub struct LoopbackBus {
  state: Mutex<BusState>,
  discovery_tx: Mutex<mpsc::Sender<TopicDescription>>,
}

impl LoopbackBus {
  pub fn new() -> Arc<LoopbackBus> {
    let (tx, rx) = mpsc::channel::<TopicDescription>();
    let bus = Arc::new(LoopbackBus {
      state: Mutex::new(BusState::default()),
      discovery_tx: Mutex::new(tx),
    });

    // The discovery thread: constructs readers in every participant for
    // each newly announced topic, like a real discovery service would.
    let weak = Arc::downgrade(&bus);
    thread::Builder::new()
      .name("loopback-discovery".to_string())
      .spawn(move || {
        while let Ok(topic) = rx.recv() {
          let Some(bus) = weak.upgrade() else { break };
          bus.distribute_topic(&topic);
        }
      })
      .expect("Cannot spawn loopback discovery thread");

    bus
  }

  /// Attach an enabler to the bus. Topics announced earlier are wired into
  /// the newcomer immediately.
  pub fn join(self: &Arc<Self>, name: &str, enabler: &Arc<DdsEnabler>) {
    self.attach(name, enabler.participant(), enabler.handler());
  }

  /// Attach a bare participant/handler pair, for setups that bypass the
  /// façade.
  pub fn attach(
    self: &Arc<Self>,
    name: &str,
    participant: &Arc<EnablerParticipant>,
    handler: &Arc<Handler>,
  ) {
    let (index, known_topics) = {
      let mut state = self.state.lock().unwrap();
      let index = state.participants.len();
      state.participants.push(BusParticipant {
        name: name.to_string(),
        participant: Arc::clone(participant),
        handler: Arc::clone(handler),
      });
      let known: Vec<TopicDescription> = state.topics.values().cloned().collect();
      (index, known)
    };
    info!("Enabler {name} joined the loopback bus.");
    for topic in known_topics {
      self.wire_reader(index, &topic);
    }
  }

  fn distribute_topic(self: &Arc<Self>, topic: &TopicDescription) {
    let count = self.state.lock().unwrap().participants.len();
    for index in 0..count {
      self.wire_reader(index, topic);
    }
  }

  fn wire_reader(self: &Arc<Self>, index: usize, topic: &TopicDescription) {
    let participant = {
      let state = self.state.lock().unwrap();
      state
        .participants
        .get(index)
        .map(|p| (p.name.clone(), Arc::clone(&p.participant)))
    };
    let Some((name, participant)) = participant else { return };
    debug!("Wiring reader of {name} for topic {}.", topic.name);

    let reader = participant.create_reader(topic);
    let weak = Arc::downgrade(self);
    reader.set_data_hook(Arc::new(move |topic, data| {
      if let Some(bus) = weak.upgrade() {
        bus.route(index, topic, data);
      }
    }));
  }

  fn route(self: &Arc<Self>, origin: usize, topic: &TopicDescription, data: PayloadData) {
    let rpc_info = RpcInfo::classify(&topic.name);
    match rpc_info.role.side() {
      Some(ServiceSide::Request) => self.route_request(origin, topic, data),
      Some(ServiceSide::Reply) => self.route_reply(origin, topic, data),
      None => self.broadcast(origin, topic, data),
    }
  }

  fn peers_of(&self, origin: usize) -> Vec<(usize, Arc<Handler>)> {
    let state = self.state.lock().unwrap();
    state
      .participants
      .iter()
      .enumerate()
      .filter(|(index, _)| *index != origin)
      .map(|(index, p)| (index, Arc::clone(&p.handler)))
      .collect()
  }

  fn route_request(self: &Arc<Self>, origin: usize, topic: &TopicDescription, data: PayloadData) {
    for (responder, handler) in self.peers_of(origin) {
      let mut copy = data.clone();
      copy.sent_request_id = None;
      handler.add_data(topic, &mut copy);

      // The handler stamped the id under which it surfaced this request;
      // remember how to route the eventual reply back.
      if let Some(local_id) = copy.sent_request_id {
        self.state.lock().unwrap().pending_requests.insert(
          (responder, local_id),
          PendingRequest {
            origin,
            origin_request_id: data.related_request_id,
          },
        );
        self.flush_deferred_replies();
      }
    }
  }

  fn route_reply(self: &Arc<Self>, responder: usize, topic: &TopicDescription, data: PayloadData) {
    let Some(related) = data.related_request_id else {
      warn!("Dropping reply without request identity on {}.", topic.name);
      return;
    };

    let pending = {
      let mut state = self.state.lock().unwrap();
      match state.pending_requests.remove(&(responder, related)) {
        Some(pending) => pending,
        None => {
          // The requester-side bookkeeping may not have caught up yet.
          state.deferred_replies.push(DeferredReply {
            responder,
            topic: topic.clone(),
            data,
          });
          return;
        }
      }
    };

    let handler = {
      let state = self.state.lock().unwrap();
      state
        .participants
        .get(pending.origin)
        .map(|p| Arc::clone(&p.handler))
    };
    let Some(handler) = handler else { return };

    let mut copy = data;
    copy.related_request_id = pending.origin_request_id;
    copy.sent_request_id = None;
    handler.add_data(topic, &mut copy);
  }

  fn flush_deferred_replies(self: &Arc<Self>) {
    loop {
      let next = {
        let mut state = self.state.lock().unwrap();
        let position = state.deferred_replies.iter().position(|deferred| {
          deferred
            .data
            .related_request_id
            .is_some_and(|related| {
              state
                .pending_requests
                .contains_key(&(deferred.responder, related))
            })
        });
        position.map(|i| state.deferred_replies.remove(i))
      };
      match next {
        Some(deferred) => self.route_reply(deferred.responder, &deferred.topic, deferred.data),
        None => break,
      }
    }
  }

  fn broadcast(self: &Arc<Self>, origin: usize, topic: &TopicDescription, data: PayloadData) {
    for (_, handler) in self.peers_of(origin) {
      let mut copy = data.clone();
      copy.related_request_id = None;
      copy.sent_request_id = None;
      handler.add_data(topic, &mut copy);
    }
  }
}

impl DiscoveryService for LoopbackBus {
  fn add_endpoint(&self, topic: &TopicDescription) -> EndpointHandle {
    let (handle, newly_known) = {
      let mut state = self.state.lock().unwrap();
      state.next_endpoint += 1;
      let handle = EndpointHandle(state.next_endpoint);
      state.endpoints.insert(handle.0, topic.name.clone());
      let newly_known = state
        .topics
        .insert(topic.name.clone(), topic.clone())
        .is_none();
      (handle, newly_known)
    };
    if newly_known {
      debug!("New topic on loopback bus: {}.", topic.name);
      let _ = self.discovery_tx.lock().unwrap().send(topic.clone());
    }
    handle
  }

  fn remove_endpoint(&self, handle: EndpointHandle) -> bool {
    self.state.lock().unwrap().endpoints.remove(&handle.0).is_some()
  }
}
