//! PPPoE discovery/session header pack and unpack (RFC 2516 §4).
//!
//! Both raw sockets in [`crate::ac`] are `AF_PACKET`/`SOCK_DGRAM` ("cooked")
//! sockets: the kernel fills in and strips the 14-byte Ethernet header
//! (destination/source MAC, ethertype) from the `sockaddr_ll` the caller
//! supplies, so only the 6-byte PPPoE header plus tag payload ever appears
//! in a recv/send buffer here.

use crate::tags::{self, TagError, TagSet};
use thiserror::Error;

pub const ETHERTYPE_DISCOVERY: u16 = 0x8863;
pub const ETHERTYPE_SESSION: u16 = 0x8864;

pub const VER_TYPE: u8 = 0x11;

pub const CODE_PADI: u8 = 0x09;
pub const CODE_PADO: u8 = 0x07;
pub const CODE_PADR: u8 = 0x19;
pub const CODE_PADS: u8 = 0x65;
pub const CODE_PADT: u8 = 0xA7;
pub const CODE_SESSION: u8 = 0x00;

const HEADER_LEN: usize = 6;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame shorter than the PPPoE header")]
    TooShort,
    #[error("unexpected ver/type nibbles")]
    BadVerType,
    #[error("declared length exceeds remaining bytes")]
    LengthOverrun,
    #[error(transparent)]
    Tag(#[from] TagError),
}

/// A parsed PPPoE discovery frame (tagged payload).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryFrame {
    pub code: u8,
    pub session_id: u16,
    pub tags: TagSet,
}

impl DiscoveryFrame {
    pub fn parse(data: &[u8]) -> Result<Self, FrameError> {
        let (code, session_id, payload) = parse_header(data)?;
        let tags = tags::parse_payload(payload)?;

        Ok(Self {
            code,
            session_id,
            tags,
        })
    }

    pub fn serialize(&self) -> Vec<u8> {
        serialize_header(self.code, self.session_id, &tags::tags_to_payload(&self.tags))
    }
}

/// A parsed PPPoE session frame (opaque PPP payload).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionFrame<'a> {
    pub session_id: u16,
    pub payload: &'a [u8],
}

impl<'a> SessionFrame<'a> {
    pub fn parse(data: &'a [u8]) -> Result<Self, FrameError> {
        let (code, session_id, payload) = parse_header(data)?;

        if code != CODE_SESSION {
            return Err(FrameError::BadVerType);
        }

        Ok(Self {
            session_id,
            payload,
        })
    }

    pub fn serialize(session_id: u16, payload: &[u8]) -> Vec<u8> {
        serialize_header(CODE_SESSION, session_id, payload)
    }
}

fn parse_header(data: &[u8]) -> Result<(u8, u16, &[u8]), FrameError> {
    if data.len() < HEADER_LEN {
        return Err(FrameError::TooShort);
    }

    if data[0] != VER_TYPE {
        return Err(FrameError::BadVerType);
    }

    let code = data[1];
    let session_id = u16::from_be_bytes([data[2], data[3]]);
    let length = u16::from_be_bytes([data[4], data[5]]) as usize;
    let payload = data[HEADER_LEN..]
        .get(..length)
        .ok_or(FrameError::LengthOverrun)?;

    Ok((code, session_id, payload))
}

fn serialize_header(code: u8, session_id: u16, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_LEN + payload.len());

    buf.push(VER_TYPE);
    buf.push(code);
    buf.extend_from_slice(&session_id.to_be_bytes());
    buf.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    buf.extend_from_slice(payload);

    buf
}
