use std::time::Duration;

/// Configuration of the enabler participant.
/// This is a builder-like struct.
#[must_use]
#[derive(Clone, Debug)]
pub struct EnablerConfiguration {
  /// How long a publish may wait for the discovery thread to construct the
  /// matching reader.
  pub reader_wait_timeout: Duration,
  /// Optional settle time after a reader is created, before the first
  /// sample is injected. Useful against sample loss when durability is not
  /// transient.
  pub initial_publish_wait: Duration,
}

impl EnablerConfiguration {
  pub fn new() -> EnablerConfiguration {
    EnablerConfiguration {
      reader_wait_timeout: Duration::from_secs(5),
      initial_publish_wait: Duration::ZERO,
    }
  }

  pub fn reader_wait_timeout(self, reader_wait_timeout: Duration) -> EnablerConfiguration {
    EnablerConfiguration {
      reader_wait_timeout,
      ..self
    }
  }

  pub fn initial_publish_wait(self, initial_publish_wait: Duration) -> EnablerConfiguration {
    EnablerConfiguration {
      initial_publish_wait,
      ..self
    }
  }
}

impl Default for EnablerConfiguration {
  fn default() -> Self {
    Self::new()
  }
}
