//! The byte unit exchanged through a transport.

use std::fmt;
use std::ops::Deref;

use bytes::Bytes;

/// Number of bytes shown by the `Debug` dump before truncation.
const DEBUG_DUMP_LIMIT: usize = 32;

/// Immutable sequence of raw bytes.
///
/// A frame is exactly one buffer's worth of data as handed to `write()` or
/// returned by `read()`. The transports never merge or split frames; an
/// empty frame from `read()` means nothing arrived before the deadline.
///
/// Cloning is cheap: the payload is reference counted.
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Frame(Bytes);

impl Frame {
    /// Create a frame from anything convertible into [`Bytes`].
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self(data.into())
    }

    /// Create an empty frame.
    pub const fn empty() -> Self {
        Self(Bytes::new())
    }

    /// Create a frame by copying a byte slice.
    pub fn copy_from_slice(data: &[u8]) -> Self {
        Self(Bytes::copy_from_slice(data))
    }

    /// Number of bytes in the frame.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the frame carries no bytes.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Borrow the raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Convert into the underlying [`Bytes`].
    pub fn into_bytes(self) -> Bytes {
        self.0
    }

    /// Copy the payload into a new vector.
    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }

    /// Hex encoding of the payload, space separated.
    pub fn to_hex(&self) -> String {
        let mut out = String::with_capacity(self.len() * 3);
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            out.push_str(&hex::encode([*byte]));
        }
        out
    }
}

impl Deref for Frame {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Bytes> for Frame {
    fn from(bytes: Bytes) -> Self {
        Self(bytes)
    }
}

impl From<Vec<u8>> for Frame {
    fn from(data: Vec<u8>) -> Self {
        Self(Bytes::from(data))
    }
}

impl From<&[u8]> for Frame {
    fn from(data: &[u8]) -> Self {
        Self::copy_from_slice(data)
    }
}

impl From<String> for Frame {
    fn from(text: String) -> Self {
        Self(Bytes::from(text))
    }
}

impl From<&'static str> for Frame {
    fn from(text: &'static str) -> Self {
        Self(Bytes::from_static(text.as_bytes()))
    }
}

impl From<Frame> for Vec<u8> {
    fn from(frame: Frame) -> Self {
        frame.0.into()
    }
}

impl From<Frame> for Bytes {
    fn from(frame: Frame) -> Self {
        frame.0
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shown = self.len().min(DEBUG_DUMP_LIMIT);
        let mut dump = hex::encode(&self.0[..shown]);
        if shown < self.len() {
            dump.push_str("..");
        }
        f.debug_struct("Frame")
            .field("len", &self.len())
            .field("data", &dump)
            .finish()
    }
}

/// Hex dump followed by the payload decoded as lossy UTF-8.
impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.to_hex(), String::from_utf8_lossy(&self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_frame() {
        let frame = Frame::empty();
        assert!(frame.is_empty());
        assert_eq!(frame.len(), 0);
        assert_eq!(frame, Frame::default());
        assert_eq!(frame.to_hex(), "");
    }

    #[test]
    fn test_frame_conversions() {
        let frame = Frame::from(vec![1u8, 2, 3]);
        assert_eq!(frame.len(), 3);
        assert_eq!(frame.as_bytes(), &[1, 2, 3]);

        let raw: Vec<u8> = frame.clone().into();
        assert_eq!(raw, vec![1, 2, 3]);

        let bytes: Bytes = frame.into();
        assert_eq!(&bytes[..], &[1, 2, 3]);

        assert_eq!(Frame::from("hi"), Frame::copy_from_slice(b"hi"));
        assert_eq!(Frame::from(String::from("hi")), Frame::from(&b"hi"[..]));
    }

    #[test]
    fn test_frame_equality_is_by_content() {
        let a = Frame::new(Bytes::from_static(b"abc"));
        let b = Frame::copy_from_slice(b"abc");
        assert_eq!(a, b);
        assert_ne!(a, Frame::from("abd"));
    }

    #[test]
    fn test_frame_display() {
        let frame = Frame::from("Hi!");
        assert_eq!(frame.to_hex(), "48 69 21");
        assert_eq!(frame.to_string(), "[48 69 21] Hi!");
    }

    #[test]
    fn test_frame_debug_truncates() {
        let frame = Frame::from(vec![0xABu8; 100]);
        let debug = format!("{frame:?}");
        assert!(debug.contains("len: 100"));
        assert!(debug.contains(".."));
        assert!(!debug.contains(&"ab".repeat(33)));
    }
}
