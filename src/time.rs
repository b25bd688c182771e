use chrono::Utc;
use serde::{Deserialize, Serialize};

/// ROS2-style timestamp: seconds and nanoseconds since the Unix epoch.
///
/// This is the stamp type carried inside goal replies, goal infos, and
/// status messages.
#[derive(
  Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Time {
  pub sec: i64,
  pub nanosec: u32,
}

impl Time {
  pub const ZERO: Time = Time { sec: 0, nanosec: 0 };

  pub fn now() -> Time {
    let now = Utc::now();
    Time {
      sec: now.timestamp(),
      nanosec: now.timestamp_subsec_nanos(),
    }
  }

  pub fn from_nanos(nanos: i64) -> Time {
    Time {
      sec: nanos.div_euclid(1_000_000_000),
      nanosec: nanos.rem_euclid(1_000_000_000) as u32,
    }
  }

  pub fn to_nanos(self) -> i64 {
    self.sec * 1_000_000_000 + i64::from(self.nanosec)
  }

  pub fn is_zero(self) -> bool {
    self == Time::ZERO
  }
}
