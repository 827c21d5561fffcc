//! FRTA control-message wire format.
//!
//! Every datagram starts with a one-byte type tag followed by a fixed-layout
//! header in network byte order. Trust values travel as the raw IEEE-754 bit
//! pattern of an `f64`, written as a big-endian `u64`, so they survive the
//! trip bit for bit.
//!
//! ```text
//! RouteRequest        tag(1) destination(4) source(4) hop_count(4)
//! RouteReply          tag(1) destination(4) next_hop(4) trust(8)
//! RouteAdvertisement  tag(1) destination(4) next_hop(4) trust(8) hop_count(4)
//! TrustUpdate         tag(1) [trust attribute(8)]
//! ```
use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::FrtaError;
use crate::types::NodeAddress;

/// Control message discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    RouteRequest = 1,
    RouteReply = 2,
    RouteAdvertisement = 3,
    TrustUpdate = 4,
}

impl MessageType {
    /// Parse a known tag. Returns `None` for anything outside 1..=4.
    pub fn try_from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(MessageType::RouteRequest),
            2 => Some(MessageType::RouteReply),
            3 => Some(MessageType::RouteAdvertisement),
            4 => Some(MessageType::TrustUpdate),
            _ => None,
        }
    }

    /// Parse a tag, treating unknown values as `RouteRequest`.
    pub fn from_tag(tag: u8) -> Self {
        Self::try_from_tag(tag).unwrap_or_else(|| {
            tracing::warn!(tag, "invalid message type received, treating as route request");
            MessageType::RouteRequest
        })
    }

    pub fn tag(self) -> u8 {
        self as u8
    }
}

fn ensure(kind: MessageType, buf: &[u8], needed: usize) -> Result<(), FrtaError> {
    if buf.remaining() < needed {
        return Err(FrtaError::Truncated {
            kind,
            needed,
            got: buf.remaining(),
        });
    }
    Ok(())
}

fn get_addr(buf: &mut &[u8]) -> NodeAddress {
    NodeAddress::from(buf.get_u32())
}

fn put_addr(buf: &mut BytesMut, addr: NodeAddress) {
    buf.put_u32(u32::from(addr));
}

/// Broadcast while searching for a route to `destination`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRequest {
    pub destination: NodeAddress,
    /// Node that started the discovery.
    pub source: NodeAddress,
    /// Hops travelled so far; 0 when first broadcast.
    pub hop_count: u32,
}

impl RouteRequest {
    pub const SIZE: usize = 12;

    fn encode(&self, buf: &mut BytesMut) {
        put_addr(buf, self.destination);
        put_addr(buf, self.source);
        buf.put_u32(self.hop_count);
    }

    fn decode(buf: &mut &[u8]) -> Result<Self, FrtaError> {
        ensure(MessageType::RouteRequest, buf, Self::SIZE)?;
        Ok(Self {
            destination: get_addr(buf),
            source: get_addr(buf),
            hop_count: buf.get_u32(),
        })
    }

    /// The same request, one hop further along.
    pub fn next_hop(&self) -> Self {
        Self {
            hop_count: self.hop_count.saturating_add(1),
            ..*self
        }
    }
}

/// Answer to a route request, unicast hop by hop back to the requester.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RouteReply {
    /// The node whose route is being answered for.
    pub destination: NodeAddress,
    /// The node the replier reaches `destination` through.
    pub next_hop: NodeAddress,
    pub trust: f64,
}

impl RouteReply {
    pub const SIZE: usize = 16;

    fn encode(&self, buf: &mut BytesMut) {
        put_addr(buf, self.destination);
        put_addr(buf, self.next_hop);
        buf.put_u64(self.trust.to_bits());
    }

    fn decode(buf: &mut &[u8]) -> Result<Self, FrtaError> {
        ensure(MessageType::RouteReply, buf, Self::SIZE)?;
        Ok(Self {
            destination: get_addr(buf),
            next_hop: get_addr(buf),
            trust: f64::from_bits(buf.get_u64()),
        })
    }
}

/// Periodic broadcast of one cached route.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RouteAdvertisement {
    pub destination: NodeAddress,
    pub next_hop: NodeAddress,
    pub trust: f64,
    /// Advertiser's hop count to `destination`.
    pub hop_count: u32,
}

impl RouteAdvertisement {
    pub const SIZE: usize = 20;

    fn encode(&self, buf: &mut BytesMut) {
        put_addr(buf, self.destination);
        put_addr(buf, self.next_hop);
        buf.put_u64(self.trust.to_bits());
        buf.put_u32(self.hop_count);
    }

    fn decode(buf: &mut &[u8]) -> Result<Self, FrtaError> {
        ensure(MessageType::RouteAdvertisement, buf, Self::SIZE)?;
        Ok(Self {
            destination: get_addr(buf),
            next_hop: get_addr(buf),
            trust: f64::from_bits(buf.get_u64()),
            hop_count: buf.get_u32(),
        })
    }
}

/// Trust attribute attached to a trust-update datagram.
///
/// It rides after the (empty) trust-update header instead of inside it, so
/// a bare tag byte is still a valid trust update.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrustTag {
    pub trust: f64,
}

impl TrustTag {
    pub const SIZE: usize = 8;
}

/// A decoded control datagram.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ControlMessage {
    RouteRequest(RouteRequest),
    RouteReply(RouteReply),
    RouteAdvertisement(RouteAdvertisement),
    TrustUpdate(Option<TrustTag>),
}

impl ControlMessage {
    pub fn message_type(&self) -> MessageType {
        match self {
            ControlMessage::RouteRequest(_) => MessageType::RouteRequest,
            ControlMessage::RouteReply(_) => MessageType::RouteReply,
            ControlMessage::RouteAdvertisement(_) => MessageType::RouteAdvertisement,
            ControlMessage::TrustUpdate(_) => MessageType::TrustUpdate,
        }
    }

    /// Encoded size in bytes, tag included.
    pub fn wire_size(&self) -> usize {
        1 + match self {
            ControlMessage::RouteRequest(_) => RouteRequest::SIZE,
            ControlMessage::RouteReply(_) => RouteReply::SIZE,
            ControlMessage::RouteAdvertisement(_) => RouteAdvertisement::SIZE,
            ControlMessage::TrustUpdate(tag) => tag.map_or(0, |_| TrustTag::SIZE),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(self.wire_size());
        buf.put_u8(self.message_type().tag());
        match self {
            ControlMessage::RouteRequest(req) => req.encode(&mut buf),
            ControlMessage::RouteReply(rep) => rep.encode(&mut buf),
            ControlMessage::RouteAdvertisement(adv) => adv.encode(&mut buf),
            ControlMessage::TrustUpdate(Some(tag)) => buf.put_u64(tag.trust.to_bits()),
            ControlMessage::TrustUpdate(None) => {}
        }
        buf.to_vec()
    }

    /// Decode one datagram. Unknown tags are read as a route request.
    pub fn from_bytes(data: &[u8]) -> Result<Self, FrtaError> {
        let mut buf = data;
        if !buf.has_remaining() {
            return Err(FrtaError::EmptyPacket);
        }
        let kind = MessageType::from_tag(buf.get_u8());
        let message = match kind {
            MessageType::RouteRequest => ControlMessage::RouteRequest(RouteRequest::decode(&mut buf)?),
            MessageType::RouteReply => ControlMessage::RouteReply(RouteReply::decode(&mut buf)?),
            MessageType::RouteAdvertisement => {
                ControlMessage::RouteAdvertisement(RouteAdvertisement::decode(&mut buf)?)
            }
            MessageType::TrustUpdate => {
                let tag = (buf.remaining() >= TrustTag::SIZE).then(|| TrustTag {
                    trust: f64::from_bits(buf.get_u64()),
                });
                ControlMessage::TrustUpdate(tag)
            }
        };
        Ok(message)
    }
}
