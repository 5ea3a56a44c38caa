//! Readiness bitmap
//!
//! One bit per connection slot. The decoder rebuilds it wholesale on every
//! readiness check; nothing ever updates a single bit in place between checks.

/// Number of bits per block
const BITS_PER_BLOCK: usize = 64;

/// Per-connection "a read would return something now" flags
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessMap {
    blocks: Box<[u64]>,
    len: usize,
}

impl ReadinessMap {
    /// Create an all-clear map for `len` connection slots
    pub fn new(len: usize) -> Self {
        let num_blocks = (len + BITS_PER_BLOCK - 1) / BITS_PER_BLOCK;
        Self {
            blocks: vec![0u64; num_blocks].into_boxed_slice(),
            len,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn clear(&mut self) {
        self.blocks.iter_mut().for_each(|b| *b = 0);
    }

    /// Mark one slot ready. Out-of-range slots are ignored.
    #[inline]
    pub fn set(&mut self, slot: usize) {
        if slot >= self.len {
            return;
        }
        self.blocks[slot / BITS_PER_BLOCK] |= 1u64 << (slot % BITS_PER_BLOCK);
    }

    /// Mark every slot in `from..len` ready
    pub fn set_from(&mut self, from: usize) {
        for slot in from..self.len {
            self.set(slot);
        }
    }

    pub fn set_all(&mut self) {
        self.set_from(0);
    }

    #[inline]
    pub fn is_set(&self, slot: usize) -> bool {
        if slot >= self.len {
            return false;
        }
        self.blocks[slot / BITS_PER_BLOCK] & (1u64 << (slot % BITS_PER_BLOCK)) != 0
    }

    pub fn any(&self) -> bool {
        self.blocks.iter().any(|&b| b != 0)
    }

    pub fn count(&self) -> usize {
        self.blocks.iter().map(|b| b.count_ones() as usize).sum()
    }

    /// Ready slots in ascending order
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len).filter(move |&slot| self.is_set(slot))
    }
}
