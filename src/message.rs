use crate::{gid::Gid, payload::{Payload, PayloadData}, time::Time, topic::TopicDescription};

/// Inbound sample envelope built by the handler before projection to the
/// application.
///
/// Holds its own reference-counted payload, which returns to the pool when
/// the message is dropped.
#[derive(Debug, Clone)]
pub struct Message {
  pub topic: TopicDescription,
  pub payload: Payload,
  pub instance_handle: String,
  pub source_guid: Gid,
  pub sequence_number: u64,
  pub publish_time: Time,
}

impl Message {
  pub fn from_data(
    topic: &TopicDescription,
    data: &PayloadData,
    sequence_number: u64,
  ) -> Message {
    Message {
      topic: topic.clone(),
      payload: data.payload.clone(),
      instance_handle: data.instance_handle.clone(),
      source_guid: data.source_guid,
      sequence_number,
      publish_time: data.source_timestamp,
    }
  }

  /// Publish time in nanoseconds since the epoch, as delivered to the
  /// application callbacks.
  pub fn publish_time_nanos(&self) -> i64 {
    self.publish_time.to_nanos()
  }
}
