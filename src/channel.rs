//! Secure channel descriptor and the transport collaborator
//!
//! Descriptor wire form: type(1) ‖ varint(len) ‖ UTF-8 payload. The only
//! defined type (0x01) joins the party URIs with ", ".

use crate::codec::{self, Reader};
use crate::error::{BetError, Result};
use crate::types::ByteString;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

const SECURE_CHANNEL_TYPE: u8 = 0x01;
const PARTY_SEPARATOR: &str = ", ";

/// How the two players reach each other
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelDescriptor {
    /// Authenticated, encrypted point-to-point link between the listed parties
    Secure { parties: Vec<String> },
}

impl ChannelDescriptor {
    pub fn secure(parties: impl IntoIterator<Item = impl Into<String>>) -> Result<Self> {
        let parties: Vec<String> = parties.into_iter().map(Into::into).collect();
        if parties.is_empty() {
            return Err(BetError::malformed("channel needs at least one party"));
        }
        if let Some(bad) = parties
            .iter()
            .find(|p| p.is_empty() || p.contains(PARTY_SEPARATOR))
        {
            return Err(BetError::malformed(format!("invalid channel party {bad:?}")));
        }
        Ok(ChannelDescriptor::Secure { parties })
    }

    pub fn type_byte(&self) -> u8 {
        match self {
            ChannelDescriptor::Secure { .. } => SECURE_CHANNEL_TYPE,
        }
    }

    pub fn parties(&self) -> &[String] {
        match self {
            ChannelDescriptor::Secure { parties } => parties,
        }
    }

    pub fn serialize_into(&self, buf: &mut ByteString) {
        buf.push(self.type_byte());
        codec::write_var_bytes(buf, self.parties().join(PARTY_SEPARATOR).as_bytes());
    }

    pub fn deserialize_from(reader: &mut Reader<'_>) -> Result<Self> {
        let kind = reader.read_u8()?;
        let payload = reader.read_var_bytes()?;
        match kind {
            SECURE_CHANNEL_TYPE => {
                let text = std::str::from_utf8(payload)
                    .map_err(|e| BetError::malformed(format!("channel payload is not UTF-8: {e}")))?;
                Self::secure(text.split(PARTY_SEPARATOR))
            }
            other => Err(BetError::malformed(format!("unknown channel type 0x{other:02x}"))),
        }
    }

    pub fn serialize(&self) -> ByteString {
        let mut buf = Vec::new();
        self.serialize_into(&mut buf);
        buf
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(bytes);
        let descriptor = Self::deserialize_from(&mut reader)?;
        reader.finish()?;
        Ok(descriptor)
    }
}

impl fmt::Display for ChannelDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.parties().join(PARTY_SEPARATOR))
    }
}

/// Reliable, authenticated, topic-filtered message exchange with one peer.
///
/// Connection setup belongs to the implementation; the protocol only sends
/// and receives on named topics.
pub trait SecureChannel {
    fn send(&mut self, topic: &str, payload: &[u8]) -> Result<()>;

    /// Next message on `topic`, or `None` once `timeout` elapses
    fn receive(&mut self, topic: &str, timeout: Duration) -> Result<Option<ByteString>>;

    fn close(&mut self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_wire_form() {
        let descriptor = ChannelDescriptor::secure(["tor://alice", "tor://bob"]).unwrap();
        let bytes = descriptor.serialize();
        assert_eq!(bytes[0], 0x01);
        assert_eq!(bytes[1] as usize, "tor://alice, tor://bob".len());
        assert_eq!(&bytes[2..], b"tor://alice, tor://bob");
        assert_eq!(ChannelDescriptor::deserialize(&bytes).unwrap(), descriptor);
    }

    #[test]
    fn test_unknown_type_rejected() {
        assert!(matches!(
            ChannelDescriptor::deserialize(&[0x02, 0x01, b'x']),
            Err(BetError::MalformedInput(_))
        ));
    }

    #[test]
    fn test_party_validation() {
        assert!(ChannelDescriptor::secure(Vec::<String>::new()).is_err());
        assert!(ChannelDescriptor::secure(["a, b"]).is_err());
        assert!(ChannelDescriptor::secure([""]).is_err());
    }

    #[test]
    fn test_display_joins_parties() {
        let descriptor = ChannelDescriptor::secure(["a", "b", "c"]).unwrap();
        assert_eq!(descriptor.to_string(), "a, b, c");
    }
}
