//! PPPoE discovery tag encoding (RFC 2516 §5.1).

use std::borrow::Cow;
use thiserror::Error;

pub const END_OF_LIST: u16 = 0x0000;
pub const SERVICE_NAME: u16 = 0x0101;
pub const AC_NAME: u16 = 0x0102;
pub const HOST_UNIQ: u16 = 0x0103;
pub const AC_COOKIE: u16 = 0x0104;
pub const VENDOR_SPECIFIC: u16 = 0x0105;
pub const RELAY_SESSION_ID: u16 = 0x0110;
pub const SERVICE_NAME_ERROR: u16 = 0x0201;
pub const AC_SYSTEM_ERROR: u16 = 0x0202;
pub const GENERIC_ERROR: u16 = 0x0203;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TagError {
    #[error("malformed tag header")]
    MalformedTag,
    #[error("non-zero-length End-Of-List tag")]
    MalformedEndOfList,
}

/// An ordered multimap from tag type to tag value, preserving duplicates.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TagSet(Vec<(u16, Vec<u8>)>);

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, ty: u16, value: impl Into<Vec<u8>>) -> &mut Self {
        self.0.push((ty, value.into()));
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (u16, &[u8])> {
        self.0.iter().map(|(t, v)| (*t, v.as_slice()))
    }

    /// The first value stored for `ty`, if any.
    pub fn get(&self, ty: u16) -> Option<&[u8]> {
        self.0.iter().find(|(t, _)| *t == ty).map(|(_, v)| v.as_slice())
    }

    /// True if more than one value is present for `ty`.
    pub fn has_duplicate(&self, ty: u16) -> bool {
        self.0.iter().filter(|(t, _)| *t == ty).count() > 1
    }

    pub fn get_utf8(&self, ty: u16) -> Option<Result<&str, std::str::Utf8Error>> {
        self.get(ty).map(std::str::from_utf8)
    }

    /// Appends `value` for `ty` onto `self` if present in `other`, used to echo
    /// Host-Uniq/Relay-Session-Id back verbatim.
    pub fn echo_from(&mut self, other: &TagSet, ty: u16) {
        if let Some(v) = other.get(ty) {
            self.push(ty, v.to_vec());
        }
    }
}

/// Concatenates all (type, value) pairs in declaration order; no canonical
/// order is required on the wire, this one is simply stable.
pub fn tags_to_payload(tags: &TagSet) -> Vec<u8> {
    let mut buf = Vec::new();

    for (ty, value) in tags.iter() {
        buf.extend_from_slice(&ty.to_be_bytes());
        buf.extend_from_slice(&(value.len() as u16).to_be_bytes());
        buf.extend_from_slice(value);
    }

    buf
}

/// Parses a tag list, stopping at End-Of-List (or at the end of `data` if no
/// End-Of-List tag is present). Trailing bytes after End-Of-List are discarded.
pub fn parse_payload(data: &[u8]) -> Result<TagSet, TagError> {
    let mut tags = TagSet::new();
    let mut rest = data;

    while !rest.is_empty() {
        if rest.len() < 4 {
            return Err(TagError::MalformedTag);
        }

        let ty = u16::from_be_bytes([rest[0], rest[1]]);
        let len = u16::from_be_bytes([rest[2], rest[3]]) as usize;
        let value = rest.get(4..4 + len).ok_or(TagError::MalformedTag)?;

        if ty == END_OF_LIST {
            if len != 0 {
                return Err(TagError::MalformedEndOfList);
            }
            break;
        }

        tags.push(ty, Cow::Borrowed(value).into_owned());
        rest = &rest[4 + len..];
    }

    Ok(tags)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_preserves_duplicates_and_empty_values() {
        let mut tags = TagSet::new();
        tags.push(SERVICE_NAME, b"svc".to_vec());
        tags.push(HOST_UNIQ, Vec::new());
        tags.push(HOST_UNIQ, b"again".to_vec());

        let wire = tags_to_payload(&tags);
        let parsed = parse_payload(&wire).unwrap();

        assert_eq!(tags, parsed);
    }

    #[test]
    fn end_of_list_truncates_trailing_bytes() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&SERVICE_NAME.to_be_bytes());
        buf.extend_from_slice(&3u16.to_be_bytes());
        buf.extend_from_slice(b"svc");
        buf.extend_from_slice(&END_OF_LIST.to_be_bytes());
        buf.extend_from_slice(&0u16.to_be_bytes());
        buf.extend_from_slice(b"garbage-after-eol");

        let parsed = parse_payload(&buf).unwrap();
        assert_eq!(parsed.get(SERVICE_NAME), Some(b"svc".as_slice()));
    }

    #[test]
    fn non_zero_length_end_of_list_is_an_error() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&END_OF_LIST.to_be_bytes());
        buf.extend_from_slice(&1u16.to_be_bytes());
        buf.push(0xff);

        assert_eq!(parse_payload(&buf), Err(TagError::MalformedEndOfList));
    }

    #[test]
    fn truncated_header_is_malformed() {
        assert_eq!(parse_payload(&[0x01, 0x01, 0x00]), Err(TagError::MalformedTag));
    }

    #[test]
    fn truncated_value_is_malformed() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&SERVICE_NAME.to_be_bytes());
        buf.extend_from_slice(&10u16.to_be_bytes());
        buf.extend_from_slice(b"short");

        assert_eq!(parse_payload(&buf), Err(TagError::MalformedTag));
    }
}
