//! Growable posting buffer.
//!
//! Safe Rust has no recoverable allocation failure on the stable `Vec` API,
//! so `OutOfMemory` is modelled as a poison flag a caller can set explicitly
//! (e.g. when a capacity pre-check against a host-provided memory budget
//! fails) rather than something this type can trigger on its own; once
//! poisoned every further append is a no-op and `finish()` reports the
//! error — first failure poisons, final check reports.

use crate::error::{Fts5Error, Fts5Result};
use crate::varint::encode_varint;

#[derive(Debug, Default)]
pub struct PostingBuffer {
    data: Vec<u8>,
    poisoned: bool,
}

impl PostingBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self {
            data: Vec::with_capacity(cap),
            poisoned: false,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Mark the buffer poisoned. Used by callers that pre-flight a host
    /// allocation budget and find it exceeded before ever touching `self`.
    pub fn poison(&mut self) {
        self.poisoned = true;
    }

    pub fn append_bytes(&mut self, src: &[u8]) {
        if self.poisoned {
            return;
        }
        self.reserve_doubling(src.len());
        self.data.extend_from_slice(src);
    }

    pub fn append_varint(&mut self, v: u64) {
        if self.poisoned {
            return;
        }
        self.reserve_doubling(10);
        encode_varint(v, &mut self.data);
    }

    pub fn append_u32be(&mut self, v: u32) {
        if self.poisoned {
            return;
        }
        self.reserve_doubling(4);
        self.data.extend_from_slice(&v.to_be_bytes());
    }

    pub fn append_zero(&mut self, n: usize) {
        if self.poisoned {
            return;
        }
        self.reserve_doubling(n);
        self.data.resize(self.data.len() + n, 0);
    }

    /// Amortised-doubling growth: if the remaining spare capacity can't fit
    /// `additional` more bytes, at least double the current capacity.
    fn reserve_doubling(&mut self, additional: usize) {
        let spare = self.data.capacity() - self.data.len();
        if spare < additional {
            let want = (self.data.capacity().max(1) * 2).max(self.data.len() + additional);
            self.data.reserve(want - self.data.len());
        }
    }

    /// Consume the buffer, failing if any append was silently dropped
    /// because the buffer had already been poisoned.
    pub fn finish(self) -> Fts5Result<Vec<u8>> {
        if self.poisoned {
            Err(Fts5Error::OutOfMemory)
        } else {
            Ok(self.data)
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_accumulate_in_order() {
        let mut buf = PostingBuffer::new();
        buf.append_varint(300);
        buf.append_bytes(b"term");
        buf.append_u32be(7);
        buf.append_zero(2);
        let out = buf.finish().unwrap();
        assert_eq!(out.len(), 2 + 4 + 4 + 2);
        assert_eq!(&out[2..6], b"term");
    }

    #[test]
    fn poison_suppresses_further_appends_and_fails_finish() {
        let mut buf = PostingBuffer::new();
        buf.append_bytes(b"ok");
        buf.poison();
        buf.append_bytes(b"dropped");
        assert_eq!(buf.as_slice(), b"ok");
        assert!(matches!(buf.finish(), Err(Fts5Error::OutOfMemory)));
    }

    #[test]
    fn empty_buffer_finishes_empty() {
        let buf = PostingBuffer::new();
        assert!(buf.is_empty());
        assert_eq!(buf.finish().unwrap(), Vec::<u8>::new());
    }
}
