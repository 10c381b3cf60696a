//! Broadcast advertisement payload.
//!
//! Layout (8 bytes, little-endian):
//! - manufacturer: 2 bytes (u16)
//! - netid: 1 byte, [`NETID_ENABLED`] or [`NETID_DISABLED`]
//! - node_id: 1 byte
//! - value: 4 bytes (i32), the sender's vstate

use bytes::{Buf, BufMut, Bytes, BytesMut};
use concord_consensus::Fixed;

use crate::error::{Error, Result};

/// Manufacturer id carried by every concord advertisement.
pub const MANUFACTURER_ID: u16 = 0x0059;

/// Network tag of a participating node.
pub const NETID_ENABLED: u8 = 0x7F;

/// Network tag of an observing-only node.
pub const NETID_DISABLED: u8 = 0x70;

/// Encoded payload size.
pub const PAYLOAD_LEN: usize = 8;

/// One node's broadcast record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Advertisement {
    pub manufacturer: u16,
    pub netid: u8,
    pub node_id: u8,
    pub value: Fixed,
}

impl Advertisement {
    /// Advertisement for this network.
    pub fn new(node_id: u8, value: Fixed, enabled: bool) -> Self {
        Self {
            manufacturer: MANUFACTURER_ID,
            netid: if enabled { NETID_ENABLED } else { NETID_DISABLED },
            node_id,
            value,
        }
    }

    /// Whether the sender participates numerically.
    pub fn is_enabled(&self) -> bool {
        self.netid == NETID_ENABLED
    }

    /// Append the payload to `buf`.
    pub fn encode_into(&self, buf: &mut BytesMut) {
        buf.reserve(PAYLOAD_LEN);
        buf.put_u16_le(self.manufacturer);
        buf.put_u8(self.netid);
        buf.put_u8(self.node_id);
        buf.put_i32_le(self.value);
    }

    /// Encode to a fresh buffer.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(PAYLOAD_LEN);
        self.encode_into(&mut buf);
        buf.freeze()
    }

    /// Decode and validate a payload.
    ///
    /// Anything that is not exactly one concord record is rejected.
    pub fn decode(mut data: &[u8]) -> Result<Self> {
        if data.len() != PAYLOAD_LEN {
            return Err(Error::WrongLength {
                expected: PAYLOAD_LEN,
                got: data.len(),
            });
        }
        let manufacturer = data.get_u16_le();
        if manufacturer != MANUFACTURER_ID {
            return Err(Error::ForeignManufacturer(manufacturer));
        }
        let netid = data.get_u8();
        if netid != NETID_ENABLED && netid != NETID_DISABLED {
            return Err(Error::UnknownNetId(netid));
        }
        let node_id = data.get_u8();
        let value = data.get_i32_le();
        Ok(Self {
            manufacturer,
            netid,
            node_id,
            value,
        })
    }
}
