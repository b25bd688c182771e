//! Reference-counted payload buffers shared between readers, writers and the
//! application, plus the per-sample metadata the transport attaches.

use std::{
  fmt,
  sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
  },
};

use bytes::Bytes;

use crate::{gid::Gid, time::Time};

/// Allocator of serialized-payload buffers.
///
/// Buffers are cheap shared views; the pool tracks how many are outstanding
/// so leaks are observable in tests.
#[derive(Debug, Default)]
pub struct PayloadPool {
  outstanding: AtomicUsize,
}

impl PayloadPool {
  pub fn new() -> Arc<PayloadPool> {
    Arc::new(PayloadPool::default())
  }

  pub fn get_payload(self: &Arc<PayloadPool>, data: Bytes) -> Payload {
    self.outstanding.fetch_add(1, Ordering::Relaxed);
    Payload {
      data,
      pool: Arc::clone(self),
    }
  }

  /// Number of payloads currently held by readers, messages or the
  /// application.
  pub fn outstanding(&self) -> usize {
    self.outstanding.load(Ordering::Relaxed)
  }

  fn release(&self) {
    self.outstanding.fetch_sub(1, Ordering::Relaxed);
  }
}

/// One serialized payload, released back to its pool on drop.
pub struct Payload {
  data: Bytes,
  pool: Arc<PayloadPool>,
}

impl Payload {
  pub fn data(&self) -> &[u8] {
    &self.data
  }

  pub fn len(&self) -> usize {
    self.data.len()
  }

  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }
}

impl Clone for Payload {
  fn clone(&self) -> Payload {
    self.pool.get_payload(self.data.clone())
  }
}

impl Drop for Payload {
  fn drop(&mut self) {
    self.pool.release();
  }
}

impl fmt::Debug for Payload {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "Payload({} bytes)", self.data.len())
  }
}

/// A sample as handed over by the transport: payload plus source metadata
/// and the RPC correlation identities.
#[derive(Debug, Clone)]
pub struct PayloadData {
  pub payload: Payload,
  pub source_guid: Gid,
  pub instance_handle: String,
  pub source_timestamp: Time,
  /// On replies: the request this sample answers. Carried in the sample's
  /// related-sample-identity on the wire.
  pub related_request_id: Option<u64>,
  /// Filled by the handler on inbound requests: the locally minted id under
  /// which this request was surfaced to the application. The transport uses
  /// it to translate the eventual reply back to the requester's identity.
  pub sent_request_id: Option<u64>,
}

impl PayloadData {
  pub fn new(payload: Payload, source_guid: Gid) -> PayloadData {
    PayloadData {
      payload,
      instance_handle: source_guid.to_string(),
      source_guid,
      source_timestamp: Time::now(),
      related_request_id: None,
      sent_request_id: None,
    }
  }
}
