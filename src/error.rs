use thiserror::Error;

use crate::rpc::{GoalId, Protocol};

/// Failures surfaced at the component boundaries of the enabler.
///
/// Internal inconsistencies that only cause a sample to be dropped are not
/// represented here; those are reported through the log callback and the
/// operation completes normally for the transport.
#[derive(Debug, Error)]
pub enum EnablerError {
  /// Publish was attempted on a topic that was never discovered and could
  /// not be resolved through the topic query callback.
  #[error("Unknown topic {0}")]
  UnknownTopic(String),

  /// No resolution path (memory, transport registry, type query callback)
  /// produced a type identifier.
  #[error("Type {0} not found")]
  TypeNotFound(String),

  /// The last element of a dependency blob did not declare the requested
  /// type name.
  #[error("Inconsistent type blob: expected {expected} as last item, found {found}")]
  InconsistentTypeBlob { expected: String, found: String },

  #[error("Serialization failed: {0}")]
  SerializationFailed(String),

  /// The bounded wait for the discovery thread to construct a reader timed
  /// out.
  #[error("Reader creation timed out for topic {0}")]
  ReaderCreationFailed(String),

  #[error("{0} is already announced by this enabler")]
  AlreadyAnnounced(String),

  #[error("{0} is not announced by this enabler")]
  NotAnnounced(String),

  #[error("Protocol {0:?} is not supported for this operation")]
  UnsupportedProtocol(Protocol),

  #[error("No such goal {0}")]
  NoSuchGoal(GoalId),

  /// A reply was requested on a service whose wire protocol was never
  /// determined.
  #[error("RPC protocol of service {0} is not known")]
  UnknownRpcProtocol(String),
}

pub type EnablerResult<T> = std::result::Result<T, EnablerError>;
