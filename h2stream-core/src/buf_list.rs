//! Append-only composition of reference-counted byte segments.

use std::collections::VecDeque;
use std::io::IoSlice;

use bytes::{Buf, Bytes, BytesMut};

/// A sequence of [`Bytes`] segments read as one contiguous [`Buf`].
///
/// Appending never copies: each segment keeps a reference to the frame
/// buffer it came from. A contiguous copy is only made by [`into_bytes`]
/// when more than one segment is present.
///
/// [`into_bytes`]: BufList::into_bytes
#[derive(Clone, Debug, Default)]
pub struct BufList {
    bufs: VecDeque<Bytes>,
    remaining: usize,
}

impl BufList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a segment. Empty segments are skipped.
    pub fn push(&mut self, buf: Bytes) {
        if buf.is_empty() {
            return;
        }
        self.remaining += buf.len();
        self.bufs.push_back(buf);
    }

    /// Total readable bytes.
    pub fn len(&self) -> usize {
        self.remaining
    }

    pub fn is_empty(&self) -> bool {
        self.remaining == 0
    }

    /// Number of segments currently held.
    pub fn segments(&self) -> usize {
        self.bufs.len()
    }

    /// Iterate the segments in order.
    pub fn iter(&self) -> impl Iterator<Item = &Bytes> {
        self.bufs.iter()
    }

    /// Collapse into a single contiguous buffer.
    pub fn into_bytes(mut self) -> Bytes {
        match self.bufs.len() {
            0 => Bytes::new(),
            1 => self.bufs.pop_front().unwrap_or_default(),
            _ => {
                let mut out = BytesMut::with_capacity(self.remaining);
                for buf in self.bufs {
                    out.extend_from_slice(&buf);
                }
                out.freeze()
            }
        }
    }
}

impl From<Bytes> for BufList {
    fn from(buf: Bytes) -> Self {
        let mut list = BufList::new();
        list.push(buf);
        list
    }
}

impl Extend<Bytes> for BufList {
    fn extend<I: IntoIterator<Item = Bytes>>(&mut self, iter: I) {
        for buf in iter {
            self.push(buf);
        }
    }
}

impl Buf for BufList {
    fn remaining(&self) -> usize {
        self.remaining
    }

    fn chunk(&self) -> &[u8] {
        self.bufs.front().map(|b| b.as_ref()).unwrap_or_default()
    }

    fn chunks_vectored<'a>(&'a self, dst: &mut [IoSlice<'a>]) -> usize {
        let mut n = 0;
        for (slot, buf) in dst.iter_mut().zip(self.bufs.iter()) {
            *slot = IoSlice::new(buf);
            n += 1;
        }
        n
    }

    fn advance(&mut self, mut cnt: usize) {
        assert!(
            cnt <= self.remaining,
            "cannot advance past remaining: {:?} <= {:?}",
            cnt,
            self.remaining
        );
        self.remaining -= cnt;
        while cnt > 0 {
            let Some(front) = self.bufs.front_mut() else {
                break;
            };
            if cnt < front.len() {
                front.advance(cnt);
                return;
            }
            cnt -= front.len();
            self.bufs.pop_front();
        }
    }

    fn copy_to_bytes(&mut self, len: usize) -> Bytes {
        // Served from the first segment without copying when it is large enough.
        if let Some(front) = self.bufs.front_mut()
            && front.len() >= len
        {
            let out = front.split_to(len);
            if front.is_empty() {
                self.bufs.pop_front();
            }
            self.remaining -= len;
            return out;
        }

        assert!(len <= self.remaining, "`len` greater than remaining");
        let mut out = BytesMut::with_capacity(len);
        let mut left = len;
        while left > 0 {
            let chunk = self.chunk();
            let n = chunk.len().min(left);
            out.extend_from_slice(&chunk[..n]);
            self.advance(n);
            left -= n;
        }
        out.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(parts: &[&'static [u8]]) -> BufList {
        let mut list = BufList::new();
        for part in parts {
            list.push(Bytes::from_static(part));
        }
        list
    }

    #[test]
    fn test_push_skips_empty() {
        let list = list(&[b"ab", b"", b"cd"]);
        assert_eq!(list.len(), 4);
        assert_eq!(list.segments(), 2);
    }

    #[test]
    fn test_into_bytes_single_segment_is_zero_copy() {
        let original = Bytes::from_static(b"hello");
        let list = BufList::from(original.clone());
        let out = list.into_bytes();
        assert_eq!(out.as_ptr(), original.as_ptr());
    }

    #[test]
    fn test_into_bytes_concatenates_in_order() {
        let list = list(&[b"one", b"two", b"three"]);
        assert_eq!(list.into_bytes(), Bytes::from_static(b"onetwothree"));
    }

    #[test]
    fn test_advance_across_segments() {
        let mut list = list(&[b"abc", b"def", b"ghi"]);
        list.advance(4);
        assert_eq!(list.remaining(), 5);
        assert_eq!(list.chunk(), b"ef");
        list.advance(5);
        assert!(list.is_empty());
        assert_eq!(list.chunk(), b"");
    }

    #[test]
    fn test_copy_to_bytes_spanning_segments() {
        let mut list = list(&[b"ab", b"cd", b"ef"]);
        assert_eq!(list.copy_to_bytes(3), Bytes::from_static(b"abc"));
        assert_eq!(list.remaining(), 3);
        assert_eq!(list.copy_to_bytes(3), Bytes::from_static(b"def"));
        assert!(list.is_empty());
    }

    #[test]
    fn test_copy_to_bytes_within_first_segment() {
        let mut list = list(&[b"abcd", b"ef"]);
        assert_eq!(list.copy_to_bytes(4), Bytes::from_static(b"abcd"));
        assert_eq!(list.segments(), 1);
        assert_eq!(list.chunk(), b"ef");
    }

    #[test]
    fn test_chunks_vectored() {
        let list = list(&[b"ab", b"cd", b"ef"]);
        let mut slices = [IoSlice::new(&[]), IoSlice::new(&[])];
        assert_eq!(list.chunks_vectored(&mut slices), 2);
        assert_eq!(&*slices[0], b"ab");
        assert_eq!(&*slices[1], b"cd");
    }
}
