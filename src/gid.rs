use std::fmt;

use serde::{Deserialize, Serialize};

/// Length of a DDS GUID prefix in bytes.
pub const GID_LENGTH: usize = 12;

/// Identity of a sample source: the GUID prefix of the writing participant.
///
/// Rendered in hex with dot separators, which is also how it appears as the
/// `"id"` field of the data notification envelope.
#[derive(
  Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Gid([u8; GID_LENGTH]);

impl Gid {
  pub const UNKNOWN: Gid = Gid([0; GID_LENGTH]);

  pub fn from_bytes(bytes: [u8; GID_LENGTH]) -> Gid {
    Gid(bytes)
  }

  /// Mint a fresh participant identity.
  pub fn new_random() -> Gid {
    let uuid = uuid::Uuid::new_v4();
    let mut bytes = [0; GID_LENGTH];
    bytes.copy_from_slice(&uuid.as_bytes()[..GID_LENGTH]);
    Gid(bytes)
  }

  pub fn as_bytes(&self) -> &[u8; GID_LENGTH] {
    &self.0
  }
}

impl fmt::Display for Gid {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for (i, b) in self.0.iter().enumerate() {
      if i != 0 {
        write!(f, ".")?;
      }
      write!(f, "{b:02x}")?;
    }
    Ok(())
  }
}

impl fmt::Debug for Gid {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "Gid({self})")
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn renders_as_dotted_hex() {
    let gid = Gid::from_bytes([0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 0xaa, 0xff]);
    assert_eq!(
      gid.to_string(),
      "00.01.02.03.04.05.06.07.08.09.aa.ff"
    );
  }

  #[test]
  fn random_gids_differ() {
    assert_ne!(Gid::new_random(), Gid::new_random());
  }
}
