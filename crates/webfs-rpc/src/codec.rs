//! Lazy MessagePack element lists.
//!
//! A message is one MessagePack array. [`LazyElementList::decode`] walks the
//! array's markers once to find where each element starts and ends, without
//! materialising any values. Each [`Element`] keeps its own encoded bytes
//! and is decoded into a concrete type only when asked, so elements of a
//! single list can have unrelated types and a receiver can read the head of
//! a message before choosing how to read its tail.
//!
//! Values are written with `rmp_serde` in named mode (structs as maps).

use std::collections::VecDeque;

use rmp::Marker;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::constants::MAX_NESTING_DEPTH;
use crate::error::ProtocolError;

// ============================================================================
// Element scanning
// ============================================================================

fn take<'a>(rd: &mut &'a [u8], n: usize) -> Result<&'a [u8], ProtocolError> {
    if rd.len() < n {
        return Err(ProtocolError::Truncated);
    }
    let (head, tail) = rd.split_at(n);
    *rd = tail;
    Ok(head)
}

fn read_be(rd: &mut &[u8], width: usize) -> Result<usize, ProtocolError> {
    let bytes = take(rd, width)?;
    Ok(bytes.iter().fold(0usize, |acc, b| (acc << 8) | *b as usize))
}

fn read_marker(rd: &mut &[u8]) -> Result<Marker, ProtocolError> {
    let byte = take(rd, 1)?[0];
    Ok(Marker::from_u8(byte))
}

/// Advance `rd` past exactly one encoded value.
fn skip_value(rd: &mut &[u8], depth: usize) -> Result<(), ProtocolError> {
    if depth > MAX_NESTING_DEPTH {
        return Err(ProtocolError::TooDeep(MAX_NESTING_DEPTH));
    }
    match read_marker(rd)? {
        Marker::FixPos(_) | Marker::FixNeg(_) | Marker::Null | Marker::True | Marker::False => {}
        Marker::U8 | Marker::I8 => {
            take(rd, 1)?;
        }
        Marker::U16 | Marker::I16 => {
            take(rd, 2)?;
        }
        Marker::U32 | Marker::I32 | Marker::F32 => {
            take(rd, 4)?;
        }
        Marker::U64 | Marker::I64 | Marker::F64 => {
            take(rd, 8)?;
        }
        Marker::FixStr(n) => {
            take(rd, n as usize)?;
        }
        Marker::Str8 | Marker::Bin8 => {
            let n = read_be(rd, 1)?;
            take(rd, n)?;
        }
        Marker::Str16 | Marker::Bin16 => {
            let n = read_be(rd, 2)?;
            take(rd, n)?;
        }
        Marker::Str32 | Marker::Bin32 => {
            let n = read_be(rd, 4)?;
            take(rd, n)?;
        }
        Marker::FixArray(n) => skip_values(rd, n as usize, depth)?,
        Marker::Array16 => {
            let n = read_be(rd, 2)?;
            skip_values(rd, n, depth)?;
        }
        Marker::Array32 => {
            let n = read_be(rd, 4)?;
            skip_values(rd, n, depth)?;
        }
        Marker::FixMap(n) => skip_values(rd, 2 * n as usize, depth)?,
        Marker::Map16 => {
            let n = read_be(rd, 2)?;
            skip_values(rd, 2 * n, depth)?;
        }
        Marker::Map32 => {
            let n = read_be(rd, 4)?;
            skip_values(rd, 2 * n, depth)?;
        }
        // Extension payloads: one type byte plus data.
        Marker::FixExt1 => {
            take(rd, 2)?;
        }
        Marker::FixExt2 => {
            take(rd, 3)?;
        }
        Marker::FixExt4 => {
            take(rd, 5)?;
        }
        Marker::FixExt8 => {
            take(rd, 9)?;
        }
        Marker::FixExt16 => {
            take(rd, 17)?;
        }
        Marker::Ext8 => {
            let n = read_be(rd, 1)?;
            take(rd, n + 1)?;
        }
        Marker::Ext16 => {
            let n = read_be(rd, 2)?;
            take(rd, n + 1)?;
        }
        Marker::Ext32 => {
            let n = read_be(rd, 4)?;
            take(rd, n + 1)?;
        }
        Marker::Reserved => return Err(ProtocolError::InvalidMarker),
    }
    Ok(())
}

fn skip_values(rd: &mut &[u8], count: usize, depth: usize) -> Result<(), ProtocolError> {
    for _ in 0..count {
        skip_value(rd, depth + 1)?;
    }
    Ok(())
}

/// Read an array header, returning its element count.
fn read_array_len(rd: &mut &[u8]) -> Result<usize, ProtocolError> {
    match read_marker(rd)? {
        Marker::FixArray(n) => Ok(n as usize),
        Marker::Array16 => read_be(rd, 2),
        Marker::Array32 => read_be(rd, 4),
        _ => Err(ProtocolError::NotAnArray),
    }
}

// ============================================================================
// Element
// ============================================================================

/// One still-encoded value from a list.
#[derive(Clone, PartialEq, Eq)]
pub struct Element {
    raw: Vec<u8>,
}

impl Element {
    /// Encode a value into a standalone element.
    pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Self, ProtocolError> {
        Ok(Self {
            raw: rmp_serde::to_vec_named(value)?,
        })
    }

    /// Wrap bytes already known to hold exactly one value.
    pub fn from_raw(raw: Vec<u8>) -> Result<Self, ProtocolError> {
        let mut rd = raw.as_slice();
        skip_value(&mut rd, 0)?;
        if !rd.is_empty() {
            return Err(ProtocolError::TrailingBytes(rd.len()));
        }
        Ok(Self { raw })
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Decode into `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        Ok(rmp_serde::from_slice(&self.raw)?)
    }

    pub fn is_array(&self) -> bool {
        matches!(
            self.raw.first().copied().map(Marker::from_u8),
            Some(Marker::FixArray(_) | Marker::Array16 | Marker::Array32)
        )
    }

    pub fn is_nil(&self) -> bool {
        self.raw.first() == Some(&0xc0)
    }

    /// Open an array-shaped element as a nested lazy list.
    pub fn as_list(&self) -> Result<LazyElementList, ProtocolError> {
        LazyElementList::decode(&self.raw)
    }
}

impl std::fmt::Debug for Element {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Element({} bytes)", self.raw.len())
    }
}

// ============================================================================
// LazyElementList
// ============================================================================

/// A decoded message: an ordered list of still-encoded elements.
#[derive(Debug, Clone, Default)]
pub struct LazyElementList {
    elements: VecDeque<Element>,
}

impl LazyElementList {
    /// Split an encoded array into its elements.
    ///
    /// Fails on anything other than exactly one well-formed array.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let mut rd = bytes;
        let count = read_array_len(&mut rd)?;
        let mut elements = VecDeque::with_capacity(count.min(1024));
        for _ in 0..count {
            let before = rd;
            skip_value(&mut rd, 1)?;
            let used = before.len() - rd.len();
            elements.push_back(Element {
                raw: before[..used].to_vec(),
            });
        }
        if !rd.is_empty() {
            return Err(ProtocolError::TrailingBytes(rd.len()));
        }
        Ok(Self { elements })
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Remove the head element without decoding it.
    pub fn take_first(&mut self) -> Result<Element, ProtocolError> {
        self.elements.pop_front().ok_or(ProtocolError::EmptyList)
    }

    /// Remove the head element and decode it as `T`.
    pub fn take_first_as<T: DeserializeOwned>(&mut self) -> Result<T, ProtocolError> {
        self.take_first()?.decode()
    }

    /// Remove the head element and open it as a nested list.
    pub fn take_first_list(&mut self) -> Result<LazyElementList, ProtocolError> {
        self.take_first()?.as_list()
    }

    pub fn get(&self, index: usize) -> Result<&Element, ProtocolError> {
        self.elements.get(index).ok_or(ProtocolError::IndexOutOfRange {
            index,
            len: self.elements.len(),
        })
    }

    /// Decode the element at `index` as `T`, leaving the list unchanged.
    pub fn get_as<T: DeserializeOwned>(&self, index: usize) -> Result<T, ProtocolError> {
        self.get(index)?.decode()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Element> {
        self.elements.iter()
    }
}

impl IntoIterator for LazyElementList {
    type Item = Element;
    type IntoIter = std::collections::vec_deque::IntoIter<Element>;

    fn into_iter(self) -> Self::IntoIter {
        self.elements.into_iter()
    }
}

// ============================================================================
// ArgList (encoding)
// ============================================================================

/// Builder for a positional, heterogeneous argument list.
///
/// ```
/// # use webfs_rpc::{ArgList, LazyElementList};
/// let bytes = ArgList::new().arg("read")?.arg(&7u64)?.encode();
/// let mut list = LazyElementList::decode(&bytes)?;
/// assert_eq!(list.take_first_as::<String>()?, "read");
/// assert_eq!(list.take_first_as::<u64>()?, 7);
/// # Ok::<(), webfs_rpc::ProtocolError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct ArgList {
    elements: Vec<Element>,
}

impl ArgList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one value.
    pub fn arg<T: Serialize + ?Sized>(mut self, value: &T) -> Result<Self, ProtocolError> {
        self.elements.push(Element::encode(value)?);
        Ok(self)
    }

    /// Append an already-encoded element.
    pub fn push(&mut self, element: Element) {
        self.elements.push(element);
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    /// Encode as one self-delimiting array.
    pub fn encode(&self) -> Vec<u8> {
        encode_array(std::iter::empty(), &self.elements)
    }
}

/// Write an array header followed by `head` then `tail` elements.
pub(crate) fn encode_array<'a>(
    head: impl IntoIterator<Item = &'a Element>,
    tail: &[Element],
) -> Vec<u8> {
    let head: Vec<&Element> = head.into_iter().collect();
    let count = head.len() + tail.len();
    let size: usize = head.iter().map(|e| e.raw.len()).sum::<usize>()
        + tail.iter().map(|e| e.raw.len()).sum::<usize>();
    let mut out = Vec::with_capacity(size + 5);
    match count {
        0..=15 => out.push(0x90 | count as u8),
        16..=0xffff => {
            out.push(0xdc);
            out.extend_from_slice(&(count as u16).to_be_bytes());
        }
        _ => {
            out.push(0xdd);
            out.extend_from_slice(&(count as u32).to_be_bytes());
        }
    }
    for e in head {
        out.extend_from_slice(&e.raw);
    }
    for e in tail {
        out.extend_from_slice(&e.raw);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Point {
        x: i32,
        label: String,
    }

    fn mixed() -> Vec<u8> {
        ArgList::new()
            .arg(&1u8)
            .unwrap()
            .arg("read_file")
            .unwrap()
            .arg(&Point {
                x: -4,
                label: "p".into(),
            })
            .unwrap()
            .arg(&vec![10u32, 20, 30])
            .unwrap()
            .arg(&Option::<u64>::None)
            .unwrap()
            .arg(&serde_bytes::ByteBuf::from(vec![0u8, 255, 7]))
            .unwrap()
            .encode()
    }

    #[test]
    fn test_mixed_elements_decode_in_order() {
        let mut list = LazyElementList::decode(&mixed()).unwrap();
        assert_eq!(list.len(), 6);
        assert_eq!(list.take_first_as::<u8>().unwrap(), 1);
        assert_eq!(list.take_first_as::<String>().unwrap(), "read_file");
        assert_eq!(
            list.take_first_as::<Point>().unwrap(),
            Point {
                x: -4,
                label: "p".into()
            }
        );
        assert_eq!(list.take_first_as::<Vec<u32>>().unwrap(), vec![10, 20, 30]);
        assert_eq!(list.take_first_as::<Option<u64>>().unwrap(), None);
        let bytes: serde_bytes::ByteBuf = list.take_first_as().unwrap();
        assert_eq!(bytes.into_vec(), vec![0u8, 255, 7]);
        assert!(list.is_empty());
    }

    #[test]
    fn test_take_first_shrinks_until_empty() {
        let mut list = LazyElementList::decode(&mixed()).unwrap();
        for remaining in (0..6).rev() {
            list.take_first().unwrap();
            assert_eq!(list.len(), remaining);
        }
        assert!(matches!(list.take_first(), Err(ProtocolError::EmptyList)));
        assert!(matches!(
            list.take_first_as::<u8>(),
            Err(ProtocolError::EmptyList)
        ));
    }

    #[test]
    fn test_get_as_is_random_access() {
        let list = LazyElementList::decode(&mixed()).unwrap();
        assert_eq!(list.get_as::<String>(1).unwrap(), "read_file");
        assert_eq!(list.get_as::<u8>(0).unwrap(), 1);
        assert_eq!(list.len(), 6);
        assert!(matches!(
            list.get(6),
            Err(ProtocolError::IndexOutOfRange { index: 6, len: 6 })
        ));
    }

    #[test]
    fn test_shape_mismatch_is_decode_error() {
        let mut list = LazyElementList::decode(&mixed()).unwrap();
        list.take_first().unwrap();
        assert!(matches!(
            list.take_first_as::<u64>(),
            Err(ProtocolError::Decode(_))
        ));
    }

    #[test]
    fn test_nested_array_yields_lazy_list() {
        let inner = ArgList::new().arg("a").unwrap().arg(&2u16).unwrap();
        let mut outer = ArgList::new().arg(&0u8).unwrap();
        outer.push(Element::from_raw(inner.encode()).unwrap());
        let mut list = LazyElementList::decode(&outer.encode()).unwrap();
        list.take_first().unwrap();

        assert!(list.get(0).unwrap().is_array());
        let mut nested = list.take_first_list().unwrap();
        assert_eq!(nested.take_first_as::<String>().unwrap(), "a");
        assert_eq!(nested.take_first_as::<u16>().unwrap(), 2);
    }

    #[test]
    fn test_large_list_uses_array16_header() {
        let mut args = ArgList::new();
        for i in 0..20u32 {
            args = args.arg(&i).unwrap();
        }
        let bytes = args.encode();
        assert_eq!(bytes[0], 0xdc);
        let list = LazyElementList::decode(&bytes).unwrap();
        assert_eq!(list.get_as::<u32>(19).unwrap(), 19);
    }

    #[test]
    fn test_truncated_message_is_rejected() {
        let bytes = mixed();
        for cut in [1, bytes.len() / 2, bytes.len() - 1] {
            assert!(
                LazyElementList::decode(&bytes[..cut]).is_err(),
                "cut at {cut} should fail"
            );
        }
    }

    #[test]
    fn test_non_array_and_trailing_bytes() {
        let scalar = rmp_serde::to_vec(&5u8).unwrap();
        assert!(matches!(
            LazyElementList::decode(&scalar),
            Err(ProtocolError::NotAnArray)
        ));

        let mut bytes = ArgList::new().arg(&1u8).unwrap().encode();
        bytes.push(0x01);
        assert!(matches!(
            LazyElementList::decode(&bytes),
            Err(ProtocolError::TrailingBytes(1))
        ));
    }

    #[test]
    fn test_reserved_marker() {
        assert!(matches!(
            LazyElementList::decode(&[0x91, 0xc1]),
            Err(ProtocolError::InvalidMarker)
        ));
    }

    #[test]
    fn test_deep_nesting_is_bounded() {
        let mut bytes = vec![0x91u8; MAX_NESTING_DEPTH + 4];
        bytes.push(0xc0);
        assert!(matches!(
            LazyElementList::decode(&bytes),
            Err(ProtocolError::TooDeep(_))
        ));
    }
}
