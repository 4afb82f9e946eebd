//! Content-addressed block pool.
//!
//! A pool splits a fixed number of hardware blocks into runs. Every run is described
//! by an item: free runs and used entries alike, kept in block order so neighbouring
//! free runs can be merged back together when an entry is released. Entries are
//! reference counted and deduplicated by content: a hash narrows the candidates and
//! the payload's own equality rule decides.

use heapless::Vec;
use log::debug;

use crate::error::{Error, Result};

pub trait PoolPayload {
    fn same_content(&self, other: &Self) -> bool;
}

/// Hash used to narrow dedup candidates.
pub fn content_hash(bytes: &[u8]) -> u32 {
    crc32fast::hash(bytes)
}

struct Entry<P> {
    hash: u32,
    usages: u16,
    dirty: bool,
    payload: P,
}

enum State<P> {
    Vacant,
    Free,
    Reserved,
    Used(Entry<P>),
}

struct Item<P> {
    start: u16,
    blocks: u16,
    state: State<P>,
}

impl<P> Item<P> {
    const fn vacant() -> Self {
        Self { start: 0, blocks: 0, state: State::Vacant }
    }

    fn is_free(&self) -> bool {
        matches!(self.state, State::Free)
    }
}

pub struct ContentPool<P, const ITEMS: usize> {
    name: &'static str,
    items: Vec<Item<P>, ITEMS>,
    /// Ids of non-vacant items, sorted by start block.
    order: Vec<u16, ITEMS>,
    vacant: Vec<u16, ITEMS>,
    blocks_count: u16,
    used_blocks: u16,
    used_items: u16,
    reserved: Option<u16>,
    dirty: bool,
}

impl<P, const ITEMS: usize> ContentPool<P, ITEMS> {
    pub fn new(name: &'static str, blocks_count: u16) -> Self {
        assert!(ITEMS > 0 && ITEMS <= u16::MAX as usize, "Invalid {name} items count: {ITEMS}");
        assert!(blocks_count > 0, "Invalid {name} blocks count: {blocks_count}");

        let mut items: Vec<Item<P>, ITEMS> = (0..ITEMS).map(|_| Item::vacant()).collect();
        items[0] = Item { start: 0, blocks: blocks_count, state: State::Free };

        let mut order = Vec::new();
        let pushed = order.push(0);
        debug_assert!(pushed.is_ok());

        Self {
            name,
            items,
            order,
            vacant: (1..ITEMS as u16).rev().collect(),
            blocks_count,
            used_blocks: 0,
            used_items: 0,
            reserved: None,
            dirty: false,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    fn entry(&self, id: u16) -> &Entry<P> {
        match self.items.get(id as usize).map(|item| &item.state) {
            Some(State::Used(entry)) => entry,
            _ => panic!("Invalid {} item id: {}", self.name, id),
        }
    }

    fn entry_mut(&mut self, id: u16) -> &mut Entry<P> {
        let name = self.name;
        match self.items.get_mut(id as usize).map(|item| &mut item.state) {
            Some(State::Used(entry)) => entry,
            _ => panic!("Invalid {name} item id: {id}"),
        }
    }

    /// First entry (in block order) whose hash and content both match.
    pub fn find(&self, hash: u32, payload: &P) -> Option<u16>
    where
        P: PoolPayload,
    {
        self.order.iter().copied().find(|&id| match &self.items[id as usize].state {
            State::Used(entry) => entry.hash == hash && entry.payload.same_content(payload),
            _ => false,
        })
    }

    /// Returns a matching live entry with one more usage when `allow_dedup` is set,
    /// otherwise allocates the first free run that fits.
    pub fn create(&mut self, blocks: u16, hash: u32, payload: P, allow_dedup: bool) -> Result<u16>
    where
        P: PoolPayload,
    {
        if allow_dedup {
            if let Some(id) = self.find(hash, &payload) {
                self.increase_usage(id);
                return Ok(id);
            }
        }

        self.allocate(blocks, hash, payload)
    }

    fn allocate(&mut self, blocks: u16, hash: u32, payload: P) -> Result<u16> {
        assert!(blocks > 0, "Invalid {} blocks count: {}", self.name, blocks);

        let exhausted = Error::PoolExhausted { pool: self.name, blocks };
        let position = self
            .order
            .iter()
            .position(|&id| {
                let item = &self.items[id as usize];
                item.is_free() && item.blocks >= blocks
            })
            .ok_or(exhausted)?;
        let id = self.split(position, blocks).ok_or(exhausted)?;

        let item = &mut self.items[id as usize];
        item.state = State::Used(Entry { hash, usages: 1, dirty: true, payload });
        let start = item.start;

        self.used_blocks += blocks;
        self.used_items += 1;
        self.dirty = true;
        debug!(target: "pool", "{}: item {} created at block {} ({} blocks)", self.name, id, start, blocks);
        Ok(id)
    }

    /// Shrinks the free run at `position` to exactly `blocks`, moving the remainder to
    /// a new free item right after it. Fails without side effects when the remainder
    /// needs an item and none is vacant.
    fn split(&mut self, position: usize, blocks: u16) -> Option<u16> {
        let id = self.order[position];
        let start = self.items[id as usize].start;
        let remaining = self.items[id as usize].blocks - blocks;

        if remaining > 0 {
            let tail = self.vacant.pop()?;
            self.items[tail as usize] = Item { start: start + blocks, blocks: remaining, state: State::Free };
            self.items[id as usize].blocks = blocks;

            let inserted = self.order.insert(position + 1, tail);
            debug_assert!(inserted.is_ok());
        }

        Some(id)
    }

    pub fn increase_usage(&mut self, id: u16) {
        self.entry_mut(id).usages += 1;
    }

    /// Returns true when the entry was released.
    pub fn decrease_usage(&mut self, id: u16) -> bool {
        let entry = self.entry_mut(id);
        entry.usages -= 1;
        if entry.usages > 0 {
            return false;
        }

        let item = &mut self.items[id as usize];
        item.state = State::Free;
        let blocks = item.blocks;
        self.used_blocks -= blocks;
        self.used_items -= 1;
        debug!(target: "pool", "{}: item {} released ({} blocks)", self.name, id, blocks);

        self.merge_free(id);
        true
    }

    fn position_of(&self, id: u16) -> usize {
        let Some(position) = self.order.iter().position(|&other| other == id) else {
            panic!("{} item {} is not in block order", self.name, id);
        };
        position
    }

    fn merge_free(&mut self, id: u16) {
        let position = self.position_of(id);

        if let Some(&next) = self.order.get(position + 1) {
            if self.items[next as usize].is_free() {
                let blocks = self.items[next as usize].blocks;
                self.items[id as usize].blocks += blocks;
                self.vacate(position + 1);
            }
        }

        if position > 0 {
            let previous = self.order[position - 1];
            if self.items[previous as usize].is_free() {
                let blocks = self.items[id as usize].blocks;
                self.items[previous as usize].blocks += blocks;
                self.vacate(position);
            }
        }
    }

    fn vacate(&mut self, position: usize) {
        let id = self.order.remove(position);
        self.items[id as usize] = Item::vacant();
        let pushed = self.vacant.push(id);
        debug_assert!(pushed.is_ok());
    }

    /// Takes the leading `blocks` blocks out of circulation. Fails when any of them
    /// is in use.
    pub fn reserve_front(&mut self, blocks: u16) -> bool {
        assert!(self.reserved.is_none(), "{} already has a reservation", self.name);

        let first = &self.items[self.order[0] as usize];
        if !first.is_free() || first.blocks < blocks {
            return false;
        }

        let Some(id) = self.split(0, blocks) else {
            return false;
        };
        self.items[id as usize].state = State::Reserved;
        self.used_blocks += blocks;
        self.reserved = Some(id);
        true
    }

    pub fn release_reserved(&mut self) {
        if let Some(id) = self.reserved.take() {
            let item = &mut self.items[id as usize];
            item.state = State::Free;
            self.used_blocks -= item.blocks;
            debug!(target: "pool", "{}: reservation released", self.name);
            self.merge_free(id);
        }
    }

    pub fn reserved_blocks(&self) -> u16 {
        self.reserved.map_or(0, |id| self.items[id as usize].blocks)
    }

    pub fn start_block(&self, id: u16) -> u16 {
        self.entry(id);
        self.items[id as usize].start
    }

    pub fn item_blocks(&self, id: u16) -> u16 {
        self.entry(id);
        self.items[id as usize].blocks
    }

    pub fn usages(&self, id: u16) -> u16 {
        self.entry(id).usages
    }

    pub fn payload(&self, id: u16) -> &P {
        &self.entry(id).payload
    }

    /// Mutable payload access; the entry is written again at the next commit.
    pub fn payload_mut(&mut self, id: u16) -> &mut P {
        self.dirty = true;
        let entry = self.entry_mut(id);
        entry.dirty = true;
        &mut entry.payload
    }

    /// Mutates the payload in place and schedules the entry for the next commit.
    pub fn update_payload<R>(&mut self, id: u16, update: impl FnOnce(&mut P) -> R) -> R {
        let entry = self.entry_mut(id);
        entry.dirty = true;
        let result = update(&mut entry.payload);
        self.dirty = true;
        result
    }

    /// Replaces the payload, rehashing it for dedup.
    pub fn set_payload(&mut self, id: u16, hash: u32, payload: P) {
        let entry = self.entry_mut(id);
        entry.hash = hash;
        entry.payload = payload;
        entry.dirty = true;
        self.dirty = true;
    }

    /// Updates the dedup hash after the payload's content changed in place.
    pub fn set_hash(&mut self, id: u16, hash: u32) {
        self.entry_mut(id).hash = hash;
    }

    pub fn set_dirty(&mut self, id: u16) {
        self.entry_mut(id).dirty = true;
        self.dirty = true;
    }

    pub fn mark_all_dirty(&mut self) {
        for item in self.items.iter_mut() {
            if let State::Used(entry) = &mut item.state {
                entry.dirty = true;
                self.dirty = true;
            }
        }
    }

    /// Hands every dirty entry to `write` in block order, then clears the dirty flags.
    /// Returns the number of entries written.
    pub fn commit(&mut self, mut write: impl FnMut(u16, u16, u16, &P)) -> usize {
        if !self.dirty {
            return 0;
        }

        let mut written = 0;
        for &id in self.order.iter() {
            let item = &mut self.items[id as usize];
            if let State::Used(entry) = &mut item.state {
                if entry.dirty {
                    write(id, item.start, item.blocks, &entry.payload);
                    entry.dirty = false;
                    written += 1;
                }
            }
        }

        self.dirty = false;
        written
    }

    pub fn used_blocks_count(&self) -> u16 {
        self.used_blocks
    }

    pub fn available_blocks_count(&self) -> u16 {
        self.blocks_count - self.used_blocks
    }

    pub fn used_items_count(&self) -> u16 {
        self.used_items
    }

    /// Upper bound of entries that could still be created.
    pub fn available_items_count(&self) -> u16 {
        let free_runs = self.order.iter().filter(|&&id| self.items[id as usize].is_free()).count();
        (self.vacant.len() + free_runs).min(self.available_blocks_count() as usize) as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Bytes(&'static [u8]);

    impl PoolPayload for Bytes {
        fn same_content(&self, other: &Self) -> bool {
            self.0 == other.0
        }
    }

    fn create<const N: usize>(pool: &mut ContentPool<Bytes, N>, bytes: &'static [u8], dedup: bool) -> Result<u16> {
        pool.create(bytes.len() as u16, content_hash(bytes), Bytes(bytes), dedup)
    }

    #[test]
    fn first_fit_in_block_order() {
        let mut pool = ContentPool::<Bytes, 4>::new("test", 8);
        let a = create(&mut pool, b"aa", true).unwrap();
        let b = create(&mut pool, b"bbb", true).unwrap();
        assert_eq!(pool.start_block(a), 0);
        assert_eq!(pool.start_block(b), 2);
        assert_eq!(pool.used_blocks_count(), 5);
        assert_eq!(pool.available_blocks_count(), 3);
    }

    #[test]
    fn equal_content_is_shared() {
        let mut pool = ContentPool::<Bytes, 4>::new("test", 8);
        let a = create(&mut pool, b"same", true).unwrap();
        let b = create(&mut pool, b"same", true).unwrap();
        assert_eq!(a, b);
        assert_eq!(pool.usages(a), 2);
        assert_eq!(pool.used_items_count(), 1);

        let forced = create(&mut pool, b"same", false).unwrap();
        assert_ne!(forced, a);
        assert_eq!(pool.used_items_count(), 2);
    }

    #[test]
    fn released_runs_merge_with_neighbours() {
        let mut pool = ContentPool::<Bytes, 4>::new("test", 8);
        let a = create(&mut pool, b"aa", true).unwrap();
        let b = create(&mut pool, b"bb", true).unwrap();
        let c = create(&mut pool, b"cc", true).unwrap();

        assert!(pool.decrease_usage(a));
        assert!(pool.decrease_usage(c));
        assert!(pool.decrease_usage(b));
        assert_eq!(pool.used_blocks_count(), 0);

        let whole = create(&mut pool, b"eightxxx", true).unwrap();
        assert_eq!(pool.start_block(whole), 0);
        assert_eq!(pool.item_blocks(whole), 8);
    }

    #[test]
    fn entry_survives_until_last_usage() {
        let mut pool = ContentPool::<Bytes, 4>::new("test", 8);
        let a = create(&mut pool, b"aa", true).unwrap();
        pool.increase_usage(a);
        assert!(!pool.decrease_usage(a));
        assert_eq!(pool.payload(a), &Bytes(b"aa"));
        assert!(pool.decrease_usage(a));
        assert_eq!(pool.find(content_hash(b"aa"), &Bytes(b"aa")), None);
    }

    #[test]
    fn exhaustion_leaves_pool_untouched() {
        let mut pool = ContentPool::<Bytes, 4>::new("test", 4);
        create(&mut pool, b"abc", true).unwrap();
        let result = create(&mut pool, b"xy", true);
        assert_eq!(result, Err(Error::PoolExhausted { pool: "test", blocks: 2 }));
        assert_eq!(pool.used_items_count(), 1);
        assert_eq!(pool.used_blocks_count(), 3);
    }

    #[test]
    fn running_out_of_items_fails_before_blocks() {
        let mut pool = ContentPool::<Bytes, 2>::new("test", 8);
        create(&mut pool, b"a", true).unwrap();
        // the tail run took the second item, so only an exact fit is left
        assert!(create(&mut pool, b"b", true).is_err());
        assert!(create(&mut pool, b"7777777", true).is_ok());
    }

    #[test]
    fn reservation_takes_the_front() {
        let mut pool = ContentPool::<Bytes, 4>::new("test", 8);
        assert!(pool.reserve_front(3));
        assert_eq!(pool.reserved_blocks(), 3);
        let a = create(&mut pool, b"a", true).unwrap();
        assert_eq!(pool.start_block(a), 3);

        pool.release_reserved();
        assert_eq!(pool.used_blocks_count(), 1);
        let b = create(&mut pool, b"bbb", true).unwrap();
        assert_eq!(pool.start_block(b), 0);
    }

    #[test]
    fn reservation_fails_over_used_blocks() {
        let mut pool = ContentPool::<Bytes, 4>::new("test", 8);
        create(&mut pool, b"a", true).unwrap();
        assert!(!pool.reserve_front(1));
        assert_eq!(pool.reserved_blocks(), 0);
    }

    #[test]
    fn commit_visits_dirty_entries_once() {
        let mut pool = ContentPool::<Bytes, 4>::new("test", 8);
        let a = create(&mut pool, b"aa", true).unwrap();
        create(&mut pool, b"bb", true).unwrap();

        let mut starts = heapless::Vec::<u16, 4>::new();
        assert_eq!(pool.commit(|_, start, _, _| starts.push(start).unwrap()), 2);
        assert_eq!(starts, [0, 2]);
        assert_eq!(pool.commit(|_, _, _, _| {}), 0);

        pool.set_dirty(a);
        assert_eq!(pool.commit(|id, _, _, _| assert_eq!(id, a)), 1);
    }
}
