use std::fmt;

/// Packed boolean array, eight cells per byte, most significant bit first.
///
/// Every bit of the backing buffer is addressable, including the padding bits
/// of the final byte. Only the first [`BitStore::initial_len`] cells were
/// declared valid by the init frame; padding bits read `false` until toggled.
///
/// Out-of-range access is a silent no-op: `get` answers `false` and `set`
/// leaves the buffer untouched. The windowing controller relies on this while
/// its totals are briefly out of sync with a freshly received init frame.
///
/// ```
/// # use beach_cells::cache::BitStore;
/// let mut store = BitStore::initialize(&[0b1000_0000], 0);
/// assert!(store.get(0));
/// store.set(7, true);
/// assert_eq!(store.as_bytes(), &[0b1000_0001]);
/// ```
#[derive(Clone, Default, PartialEq, Eq)]
pub struct BitStore {
    bytes: Vec<u8>,
    initial_len: usize,
}

impl BitStore {
    /// Builds a store from an init body. `last_byte_bits` is the count of
    /// valid bits in the final byte, where 0 means all eight are valid.
    pub fn initialize(bytes: &[u8], last_byte_bits: u8) -> Self {
        let initial_len = match bytes.len() {
            0 => 0,
            len => {
                let tail = match last_byte_bits & 0b111 {
                    0 => 8,
                    bits => bits as usize,
                };
                (len - 1) * 8 + tail
            }
        };
        Self {
            bytes: bytes.to_vec(),
            initial_len,
        }
    }

    /// Addressable bit count (`bytes × 8`).
    #[inline]
    pub fn size(&self) -> usize {
        self.bytes.len() * 8
    }

    /// Number of cells the init frame declared valid.
    #[inline]
    pub fn initial_len(&self) -> usize {
        self.initial_len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    #[inline]
    pub fn get(&self, index: usize) -> bool {
        self.try_get(index).unwrap_or(false)
    }

    pub fn try_get(&self, index: usize) -> Option<bool> {
        let byte = self.bytes.get(index / 8)?;
        Some((byte >> (7 - index % 8)) & 1 == 1)
    }

    /// Sets one cell. Returns `false` when `index` is outside the buffer.
    pub fn set(&mut self, index: usize, value: bool) -> bool {
        let Some(byte) = self.bytes.get_mut(index / 8) else {
            return false;
        };
        let mask = 1u8 << (7 - index % 8);
        if value {
            *byte |= mask;
        } else {
            *byte &= !mask;
        }
        true
    }

    /// Lazily enumerates the first `initial_len` cells from the current buffer.
    pub fn initial_cells(&self) -> InitialCells<'_> {
        InitialCells {
            store: self,
            next: 0,
            end: self.initial_len,
        }
    }

    /// Count of set cells across the whole buffer, padding included.
    pub fn count_set(&self) -> usize {
        self.bytes.iter().map(|byte| byte.count_ones() as usize).sum()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for BitStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BitStore")
            .field("size", &self.size())
            .field("initial_len", &self.initial_len)
            .field("set", &self.count_set())
            .finish()
    }
}

/// Iterator returned by [`BitStore::initial_cells`].
#[derive(Debug, Clone)]
pub struct InitialCells<'a> {
    store: &'a BitStore,
    next: usize,
    end: usize,
}

impl Iterator for InitialCells<'_> {
    type Item = bool;

    fn next(&mut self) -> Option<bool> {
        if self.next >= self.end {
            return None;
        }
        let value = self.store.get(self.next);
        self.next += 1;
        Some(value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.end - self.next;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for InitialCells<'_> {}
