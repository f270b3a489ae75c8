//! Bounded write buffer
//!
//! Accumulates bytes between loop steps. Capacity is a hard limit: the
//! buffer never grows on `push`, only on an explicit `resize`.

use crate::error::{BridgeError, Result};
use bytes::{Bytes, BytesMut};

pub(crate) struct WriteBuffer {
    pending: BytesMut,
    capacity: usize,
}

impl WriteBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            pending: BytesMut::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn remaining(&self) -> usize {
        self.capacity - self.pending.len()
    }

    /// Append `data`, or fail without touching the pending bytes
    pub fn push(&mut self, data: &[u8]) -> Result<()> {
        let remaining = self.remaining();
        if data.len() > remaining {
            return Err(BridgeError::WriteCapacityExceeded {
                requested: data.len(),
                remaining,
            });
        }
        self.pending.extend_from_slice(data);
        Ok(())
    }

    /// Take everything pending, leaving the buffer empty
    pub fn take(&mut self) -> Option<Bytes> {
        if self.pending.is_empty() {
            None
        } else {
            Some(self.pending.split().freeze())
        }
    }

    /// Change capacity, carrying pending bytes over to the new allocation
    pub fn resize(&mut self, capacity: usize) -> Result<()> {
        if capacity < self.pending.len() {
            return Err(BridgeError::BufferTooSmall {
                requested: capacity,
                pending: self.pending.len(),
            });
        }
        let mut resized = BytesMut::with_capacity(capacity);
        resized.extend_from_slice(&self.pending);
        self.pending = resized;
        self.capacity = capacity;
        Ok(())
    }

    /// Copy of the pending bytes
    pub fn snapshot(&self) -> Bytes {
        Bytes::copy_from_slice(&self.pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_push_up_to_capacity() {
        let mut buf = WriteBuffer::with_capacity(4);
        buf.push(&[1, 2]).unwrap();
        buf.push(&[3, 4]).unwrap();
        assert_eq!(buf.remaining(), 0);

        let err = buf.push(&[5]).unwrap_err();
        assert!(matches!(
            err,
            BridgeError::WriteCapacityExceeded {
                requested: 1,
                remaining: 0
            }
        ));
        assert_eq!(buf.snapshot().as_ref(), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_take_empties_buffer() {
        let mut buf = WriteBuffer::with_capacity(8);
        assert!(buf.take().is_none());

        buf.push(b"abc").unwrap();
        assert_eq!(buf.take().unwrap().as_ref(), b"abc");
        assert!(buf.take().is_none());
        assert_eq!(buf.remaining(), 8);
    }

    #[test]
    fn test_resize_below_pending_fails() {
        let mut buf = WriteBuffer::with_capacity(8);
        buf.push(b"abcdef").unwrap();

        let err = buf.resize(4).unwrap_err();
        assert!(matches!(
            err,
            BridgeError::BufferTooSmall {
                requested: 4,
                pending: 6
            }
        ));
        assert_eq!(buf.capacity(), 8);
        assert_eq!(buf.snapshot().as_ref(), b"abcdef");
    }

    #[test]
    fn test_resize_grows_remaining() {
        let mut buf = WriteBuffer::with_capacity(2);
        buf.push(b"ab").unwrap();
        buf.resize(5).unwrap();
        buf.push(b"cde").unwrap();
        assert_eq!(buf.take().unwrap().as_ref(), b"abcde");
    }

    proptest! {
        #[test]
        fn prop_chunks_within_capacity_come_out_in_order(
            chunks in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..32), 0..16),
            extra in 0usize..64,
        ) {
            let expected: Vec<u8> = chunks.concat();
            let mut buf = WriteBuffer::with_capacity(expected.len() + extra);
            for chunk in &chunks {
                prop_assert!(buf.push(chunk).is_ok());
            }
            let drained = buf.take().map(|b| b.to_vec()).unwrap_or_default();
            prop_assert_eq!(drained, expected);
        }

        #[test]
        fn prop_resize_preserves_pending(
            data in proptest::collection::vec(any::<u8>(), 0..128),
            slack in 0usize..64,
            grow in 0usize..64,
        ) {
            let mut buf = WriteBuffer::with_capacity(data.len() + slack);
            buf.push(&data).unwrap();
            let before = buf.snapshot();

            buf.resize(data.len() + grow).unwrap();

            prop_assert_eq!(buf.snapshot(), before);
            prop_assert_eq!(buf.remaining(), grow);
        }
    }
}
