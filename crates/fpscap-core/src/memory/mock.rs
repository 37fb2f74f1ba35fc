//! In-memory [`ProcessMemory`] double for resolver and patch-loop tests.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::error::{Error, Result};

use super::ProcessMemory;

#[derive(Default)]
struct MockState {
    regions: BTreeMap<u64, Vec<u8>>,
    /// Per-address scripted responses, consumed before the backing regions.
    scripted_reads: HashMap<u64, VecDeque<Vec<u8>>>,
    write_log: Vec<(u64, Vec<u8>)>,
}

pub struct MockProcessMemory {
    state: Mutex<MockState>,
    alive: AtomicBool,
    /// When set, `is_alive` flips to false once this many reads have landed.
    alive_for_reads: Option<usize>,
    fail_reads: bool,
    fail_writes: bool,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

pub struct MockMemoryBuilder {
    regions: BTreeMap<u64, Vec<u8>>,
    scripted_reads: HashMap<u64, VecDeque<Vec<u8>>>,
    alive_for_reads: Option<usize>,
    fail_reads: bool,
    fail_writes: bool,
}

impl MockMemoryBuilder {
    pub fn new() -> Self {
        Self {
            regions: BTreeMap::new(),
            scripted_reads: HashMap::new(),
            alive_for_reads: None,
            fail_reads: false,
            fail_writes: false,
        }
    }

    pub fn region(mut self, base: u64, bytes: Vec<u8>) -> Self {
        self.regions.insert(base, bytes);
        self
    }

    /// Queue a response for reads at exactly `address`; responses are
    /// consumed in order, after which the backing regions take over.
    pub fn scripted_read(mut self, address: u64, bytes: Vec<u8>) -> Self {
        self.scripted_reads
            .entry(address)
            .or_default()
            .push_back(bytes);
        self
    }

    /// The process reports itself dead after `reads` successful reads.
    pub fn alive_for_reads(mut self, reads: usize) -> Self {
        self.alive_for_reads = Some(reads);
        self
    }

    pub fn fail_reads(mut self) -> Self {
        self.fail_reads = true;
        self
    }

    pub fn fail_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    pub fn build(self) -> MockProcessMemory {
        MockProcessMemory {
            state: Mutex::new(MockState {
                regions: self.regions,
                scripted_reads: self.scripted_reads,
                write_log: Vec::new(),
            }),
            alive: AtomicBool::new(true),
            alive_for_reads: self.alive_for_reads,
            fail_reads: self.fail_reads,
            fail_writes: self.fail_writes,
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }
}

impl Default for MockMemoryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProcessMemory {
    pub fn kill(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn writes_at(&self, address: u64) -> Vec<Vec<u8>> {
        let state = self.state.lock().unwrap();
        state
            .write_log
            .iter()
            .filter(|(a, _)| *a == address)
            .map(|(_, data)| data.clone())
            .collect()
    }

    fn locate(regions: &BTreeMap<u64, Vec<u8>>, address: u64) -> Option<(u64, usize)> {
        let (base, bytes) = regions.range(..=address).next_back()?;
        let offset = (address - base) as usize;
        (offset < bytes.len()).then_some((*base, offset))
    }
}

impl ProcessMemory for MockProcessMemory {
    fn read_bytes(&self, address: u64, len: usize) -> Result<Vec<u8>> {
        if self.fail_reads {
            return Err(Error::MemoryReadFailed {
                address,
                message: "injected failure".to_string(),
            });
        }

        let mut state = self.state.lock().unwrap();
        self.reads.fetch_add(1, Ordering::SeqCst);

        if let Some(queue) = state.scripted_reads.get_mut(&address) {
            if let Some(bytes) = queue.pop_front() {
                return Ok(bytes);
            }
        }

        match Self::locate(&state.regions, address) {
            Some((base, offset)) => {
                let bytes = &state.regions[&base];
                let end = (offset + len).min(bytes.len());
                Ok(bytes[offset..end].to_vec())
            }
            None => Err(Error::MemoryReadFailed {
                address,
                message: "unmapped address".to_string(),
            }),
        }
    }

    fn write_bytes(&self, address: u64, data: &[u8]) -> Result<usize> {
        if self.fail_writes {
            return Err(Error::MemoryWriteFailed {
                address,
                message: "injected failure".to_string(),
            });
        }

        let mut state = self.state.lock().unwrap();
        self.writes.fetch_add(1, Ordering::SeqCst);

        let (base, offset) =
            Self::locate(&state.regions, address).ok_or(Error::MemoryWriteFailed {
                address,
                message: "unmapped address".to_string(),
            })?;

        state.write_log.push((address, data.to_vec()));
        let bytes = state.regions.get_mut(&base).unwrap();
        let end = (offset + data.len()).min(bytes.len());
        let written = end - offset;
        bytes[offset..end].copy_from_slice(&data[..written]);
        Ok(written)
    }

    fn is_alive(&self) -> bool {
        if let Some(limit) = self.alive_for_reads {
            if self.read_count() >= limit {
                return false;
            }
        }
        self.alive.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_spans_region_and_truncates_at_end() {
        let mem = MockMemoryBuilder::new()
            .region(0x100, vec![1, 2, 3, 4])
            .build();
        assert_eq!(mem.read_bytes(0x101, 2).unwrap(), vec![2, 3]);
        assert_eq!(mem.read_bytes(0x102, 8).unwrap(), vec![3, 4]);
        assert!(mem.read_bytes(0x200, 1).is_err());
    }

    #[test]
    fn scripted_reads_take_precedence_then_fall_through() {
        let mem = MockMemoryBuilder::new()
            .region(0x100, vec![0xFF; 8])
            .scripted_read(0x100, vec![0u8; 8])
            .build();
        assert_eq!(mem.read_bytes(0x100, 8).unwrap(), vec![0u8; 8]);
        assert_eq!(mem.read_bytes(0x100, 8).unwrap(), vec![0xFF; 8]);
    }

    #[test]
    fn writes_mutate_backing_region_and_are_logged() {
        let mem = MockMemoryBuilder::new()
            .region(0x100, vec![0; 4])
            .build();
        assert_eq!(mem.write_bytes(0x100, &120i32.to_le_bytes()).unwrap(), 4);
        assert_eq!(mem.read_i32(0x100).unwrap(), 120);
        assert_eq!(mem.writes_at(0x100).len(), 1);
    }

    #[test]
    fn alive_for_reads_expires() {
        let mem = MockMemoryBuilder::new()
            .region(0x100, vec![0; 4])
            .alive_for_reads(2)
            .build();
        assert!(mem.is_alive());
        mem.read_bytes(0x100, 4).unwrap();
        assert!(mem.is_alive());
        mem.read_bytes(0x100, 4).unwrap();
        assert!(!mem.is_alive());
    }
}
