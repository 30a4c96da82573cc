//! Word-addressed main-storage interface.
//!
//! The instruction processor never sees bytes: every access trades 36-bit
//! words against an absolute offset within a particular processor's storage
//! bank. A single [`StorageUnit`] implementation may be shared by several
//! instruction processors (the "main storage processor" of the real
//! hardware); access per address must be linearizable across them.

use std::sync::{Arc, Mutex};

use thiserror::Error;

/// A 36-bit word, stored in the low 36 bits of a `u64`.
pub type Word36 = u64;

/// Unit Processor Identifier — identifies a storage consumer in the complex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Upi(pub u16);

/// Failures from the storage interface itself (not architectural interrupts).
///
/// These represent configuration or emulator-implementation problems — an
/// offset with no backing storage, or a UPI the storage unit doesn't know
/// about — and are surfaced as machine checks by callers, not as addressing
/// exceptions (which are an architectural concept resolved in the address
/// translation layer before storage is ever touched).
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// The given UPI has no storage mapped for it.
    #[error("no storage mapped for UPI {0:?}")]
    UnknownUpi(Upi),
    /// The offset lies outside the storage mapped for this UPI.
    #[error("offset {offset:#o} outside storage bounds for UPI {upi:?}")]
    OutOfRange { upi: Upi, offset: u32 },
}

/// Abstract word-addressed storage, indexed by (UPI, absolute offset).
///
/// Implementations back a single flat array of 36-bit words per UPI. Block
/// operations are provided as a convenience over repeated single-word
/// accesses; the architecture does not require them to be atomic as a
/// whole, only restartable, so a default implementation in terms of
/// `read_absolute`/`write_absolute` is always correct.
pub trait StorageUnit {
    /// Read one word at an absolute offset.
    fn read_absolute(&self, upi: Upi, offset: u32) -> Result<Word36, StorageError>;

    /// Write one word at an absolute offset.
    fn write_absolute(&mut self, upi: Upi, offset: u32, word: Word36) -> Result<(), StorageError>;

    /// Read `count` consecutive words starting at `offset`.
    fn read_block(&self, upi: Upi, offset: u32, count: u32) -> Result<Vec<Word36>, StorageError> {
        (0..count)
            .map(|i| self.read_absolute(upi, offset + i))
            .collect()
    }

    /// Write `words` starting at `offset`.
    fn write_block(&mut self, upi: Upi, offset: u32, words: &[Word36]) -> Result<(), StorageError> {
        for (i, word) in words.iter().enumerate() {
            self.write_absolute(upi, offset + i as u32, *word)?;
        }
        Ok(())
    }
}

/// A flat in-memory [`StorageUnit`] backing a single UPI.
///
/// Used by the test suite and by standalone tooling; a full system would
/// back several processors against one shared main-storage processor
/// implementing this same trait.
#[derive(Debug, Clone)]
pub struct FlatStorage {
    upi: Upi,
    words: Vec<Word36>,
}

impl FlatStorage {
    /// Create storage of `size` words, all zero, answering to `upi`.
    #[must_use]
    pub fn new(upi: Upi, size: u32) -> Self {
        Self {
            upi,
            words: vec![0; size as usize],
        }
    }

    /// Load `words` at `offset`, growing the backing store if necessary.
    pub fn load(&mut self, offset: u32, words: &[Word36]) {
        let end = offset as usize + words.len();
        if end > self.words.len() {
            self.words.resize(end, 0);
        }
        self.words[offset as usize..end].copy_from_slice(words);
    }
}

impl StorageUnit for FlatStorage {
    fn read_absolute(&self, upi: Upi, offset: u32) -> Result<Word36, StorageError> {
        if upi != self.upi {
            return Err(StorageError::UnknownUpi(upi));
        }
        self.words
            .get(offset as usize)
            .copied()
            .ok_or(StorageError::OutOfRange { upi, offset })
    }

    fn write_absolute(&mut self, upi: Upi, offset: u32, word: Word36) -> Result<(), StorageError> {
        if upi != self.upi {
            return Err(StorageError::UnknownUpi(upi));
        }
        let slot = self
            .words
            .get_mut(offset as usize)
            .ok_or(StorageError::OutOfRange { upi, offset })?;
        *slot = word & 0o777_777_777_777;
        Ok(())
    }
}

/// A main-storage processor is, architecturally, one abstraction shared by
/// every instruction processor attached to it. `Arc<Mutex<T>>` is the
/// natural way to hand the same [`StorageUnit`] to several [`crate`]
/// consumers while upholding the per-word linearizability the trait's
/// contract requires; this blanket impl lets callers construct a
/// `Processor` generic over storage without special-casing the shared
/// case.
impl<T: StorageUnit> StorageUnit for Arc<Mutex<T>> {
    fn read_absolute(&self, upi: Upi, offset: u32) -> Result<Word36, StorageError> {
        self.lock().expect("storage mutex poisoned").read_absolute(upi, offset)
    }

    fn write_absolute(&mut self, upi: Upi, offset: u32, word: Word36) -> Result<(), StorageError> {
        self.lock().expect("storage mutex poisoned").write_absolute(upi, offset, word)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_after_write_round_trips() {
        let upi = Upi(1);
        let mut storage = FlatStorage::new(upi, 16);
        storage.write_absolute(upi, 4, 0o123456_765432).unwrap();
        assert_eq!(storage.read_absolute(upi, 4).unwrap(), 0o123456_765432);
    }

    #[test]
    fn unknown_upi_is_rejected() {
        let storage = FlatStorage::new(Upi(1), 4);
        assert_eq!(
            storage.read_absolute(Upi(2), 0),
            Err(StorageError::UnknownUpi(Upi(2)))
        );
    }

    #[test]
    fn out_of_range_offset_is_rejected() {
        let storage = FlatStorage::new(Upi(1), 4);
        assert_eq!(
            storage.read_absolute(Upi(1), 10),
            Err(StorageError::OutOfRange {
                upi: Upi(1),
                offset: 10
            })
        );
    }

    #[test]
    fn block_ops_round_trip() {
        let upi = Upi(1);
        let mut storage = FlatStorage::new(upi, 8);
        storage.write_block(upi, 2, &[1, 2, 3]).unwrap();
        assert_eq!(storage.read_block(upi, 2, 3).unwrap(), vec![1, 2, 3]);
    }
}
