//! Verified link tracking.
//!
//! A link is the tuple (interface, source address, device index, neighbor
//! id) observed on an authenticated packet. The table is bounded; once
//! full, new tuples are dropped rather than evicting verified state.

use filament_core::{DevIdx, GlobalId};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkId(pub u32);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct LinkKey {
    iface: String,
    addr: [u8; 16],
    dev_idx: DevIdx,
    neighbor: GlobalId,
}

#[derive(Debug)]
pub struct LinkTable {
    links: HashMap<LinkKey, LinkId>,
    next: u32,
    capacity: usize,
}

impl LinkTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            links: HashMap::new(),
            next: 0,
            capacity,
        }
    }

    /// Returns the id for this link tuple, creating it if the table has
    /// room. `None` means the table is full and the tuple is new.
    pub fn get_or_create(
        &mut self,
        iface: &str,
        addr: [u8; 16],
        dev_idx: DevIdx,
        neighbor: GlobalId,
    ) -> Option<LinkId> {
        let key = LinkKey {
            iface: iface.to_owned(),
            addr,
            dev_idx,
            neighbor,
        };
        if let Some(id) = self.links.get(&key) {
            return Some(*id);
        }
        if self.links.len() >= self.capacity {
            return None;
        }
        let id = LinkId(self.next);
        self.next = self.next.wrapping_add(1);
        self.links.insert(key, id);
        Some(id)
    }

    /// Drops every link attributed to `neighbor`.
    pub fn purge_neighbor(&mut self, neighbor: &GlobalId) -> usize {
        let before = self.links.len();
        self.links.retain(|key, _| key.neighbor != *neighbor);
        before - self.links.len()
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(byte: u8) -> GlobalId {
        GlobalId::from_bytes([byte; 32])
    }

    #[test]
    fn test_same_tuple_same_link() {
        let mut table = LinkTable::new(4);
        let a = table.get_or_create("wlan0", [1; 16], 0, id(1)).unwrap();
        let b = table.get_or_create("wlan0", [1; 16], 0, id(1)).unwrap();
        assert_eq!(a, b);
        let c = table.get_or_create("wlan0", [1; 16], 1, id(1)).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_capacity_bounds_new_tuples() {
        let mut table = LinkTable::new(1);
        let a = table.get_or_create("eth0", [2; 16], 0, id(2)).unwrap();
        assert!(table.get_or_create("eth0", [3; 16], 0, id(2)).is_none());
        // Existing tuples keep resolving when full.
        assert_eq!(table.get_or_create("eth0", [2; 16], 0, id(2)), Some(a));
    }

    #[test]
    fn test_purge_neighbor() {
        let mut table = LinkTable::new(8);
        table.get_or_create("eth0", [1; 16], 0, id(1)).unwrap();
        table.get_or_create("eth0", [1; 16], 1, id(1)).unwrap();
        table.get_or_create("eth0", [2; 16], 0, id(2)).unwrap();
        assert_eq!(table.purge_neighbor(&id(1)), 2);
        assert_eq!(table.len(), 1);
    }
}
