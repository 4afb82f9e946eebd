//! Tile banks.
//!
//! One block is one 8×8 tile at 4 bits per pixel (an 8 bits per pixel tile takes two).
//! Entries reference tile data owned by the caller; nothing is copied until commit.
//! Allocated entries own a staging buffer instead, written through [`TilesHandle::vram`].

use alloc::boxed::Box;
use alloc::rc::Rc;
use alloc::vec;
use core::cell::{Ref, RefCell, RefMut};
use core::fmt;
use core::hash::{Hash, Hasher};

use bytemuck::{Pod, Zeroable};
use log::debug;
use vbank_hw::memory::TILE_WORDS;

use crate::config::MAX_TILES_ITEMS;
use crate::error::{Creation, Result};
use crate::pool::{content_hash, ContentPool, PoolPayload};
use crate::source::SourceRef;

#[repr(transparent)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Tile(pub [u16; TILE_WORDS]);

unsafe impl Zeroable for Tile {}
unsafe impl Pod for Tile {}

/// Tile data to find or create a tiles entry with.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TilesItem {
    tiles: SourceRef<Tile>,
}

impl TilesItem {
    pub fn new(tiles: SourceRef<Tile>) -> Self {
        assert!(
            !tiles.is_empty() && tiles.len() <= u16::MAX as usize,
            "Invalid tiles count: {}", tiles.len()
        );
        Self { tiles }
    }

    pub fn from_static(tiles: &'static [Tile]) -> Self {
        Self::new(SourceRef::from_static(tiles))
    }

    pub fn tiles_ref(&self) -> SourceRef<Tile> {
        self.tiles
    }

    pub fn tiles_count(&self) -> u16 {
        self.tiles.len() as u16
    }

    fn hash(&self) -> u32 {
        content_hash(self.tiles.bytes())
    }
}

enum TilesEntry {
    Source(SourceRef<Tile>),
    /// Allocated entry, zero-filled until written.
    Staged(Box<[Tile]>),
}

impl PoolPayload for TilesEntry {
    fn same_content(&self, other: &Self) -> bool {
        match (self, other) {
            (TilesEntry::Source(a), TilesEntry::Source(b)) => a.same_content(b),
            _ => false,
        }
    }
}

impl TilesEntry {
    fn source(&self) -> Option<SourceRef<Tile>> {
        match self {
            TilesEntry::Source(source) => Some(*source),
            TilesEntry::Staged(_) => None,
        }
    }

    fn tiles(&self) -> &[Tile] {
        match self {
            TilesEntry::Source(source) => source.as_slice(),
            TilesEntry::Staged(tiles) => &tiles[..],
        }
    }
}

pub struct TilesBank {
    name: &'static str,
    pool: ContentPool<TilesEntry, MAX_TILES_ITEMS>,
}

impl TilesBank {
    pub fn new(name: &'static str, blocks_count: u16) -> Self {
        Self { name, pool: ContentPool::new(name, blocks_count) }
    }

    pub fn find(&self, item: &TilesItem) -> Option<u16> {
        self.pool.find(item.hash(), &TilesEntry::Source(item.tiles))
    }

    pub fn create(&mut self, item: &TilesItem, allow_dedup: bool) -> Result<u16> {
        let id = self.pool.create(item.tiles_count(), item.hash(), TilesEntry::Source(item.tiles), allow_dedup)?;
        debug!(target: "tiles", "{}: tiles {} ({} tiles)", self.name, id, item.tiles_count());
        Ok(id)
    }

    /// Entry without source data; it's never shared by dedup.
    pub fn allocate(&mut self, tiles_count: u16) -> Result<u16> {
        assert!(tiles_count > 0, "Invalid tiles count: {tiles_count}");
        let staging = vec![Tile::default(); tiles_count as usize].into_boxed_slice();
        let id = self.pool.create(tiles_count, 0, TilesEntry::Staged(staging), false)?;
        debug!(target: "tiles", "{}: tiles {} allocated ({} tiles)", self.name, id, tiles_count);
        Ok(id)
    }

    pub fn increase_usage(&mut self, id: u16) {
        self.pool.increase_usage(id);
    }

    pub fn decrease_usage(&mut self, id: u16) {
        self.pool.decrease_usage(id);
    }

    pub fn usages(&self, id: u16) -> u16 {
        self.pool.usages(id)
    }

    pub fn start_block(&self, id: u16) -> u16 {
        self.pool.start_block(id)
    }

    pub fn tiles_count(&self, id: u16) -> u16 {
        self.pool.item_blocks(id)
    }

    pub fn tiles_ref(&self, id: u16) -> Option<SourceRef<Tile>> {
        self.pool.payload(id).source()
    }

    /// Staging tiles of an allocated entry, copied at the next commit. `None` for
    /// entries referencing source data.
    pub fn vram_mut(&mut self, id: u16) -> Option<&mut [Tile]> {
        if self.tiles_ref(id).is_some() {
            return None;
        }

        match self.pool.payload_mut(id) {
            TilesEntry::Staged(tiles) => Some(&mut tiles[..]),
            TilesEntry::Source(_) => None,
        }
    }

    /// Points the entry at other tile data with the same tiles count.
    pub fn set_tiles_ref(&mut self, id: u16, item: &TilesItem) {
        assert!(
            item.tiles_count() == self.tiles_count(id),
            "Invalid tiles count: {} - {}", item.tiles_count(), self.tiles_count(id)
        );
        self.pool.set_payload(id, item.hash(), TilesEntry::Source(item.tiles));
    }

    /// Copies the referenced data again at the next commit.
    pub fn reload_tiles_ref(&mut self, id: u16) {
        let hash = self.tiles_ref(id).map_or(0, |source| content_hash(source.bytes()));
        self.pool.set_hash(id, hash);
        self.pool.set_dirty(id);
    }

    pub fn used_tiles_count(&self) -> u16 {
        self.pool.used_blocks_count()
    }

    pub fn available_tiles_count(&self) -> u16 {
        self.pool.available_blocks_count()
    }

    pub fn used_items_count(&self) -> u16 {
        self.pool.used_items_count()
    }

    pub fn available_items_count(&self) -> u16 {
        self.pool.available_items_count()
    }

    /// Copies dirty entries to tile RAM. Returns the number of entries written.
    pub fn commit(&mut self, ram: &mut [u16]) -> usize {
        let written = self.pool.commit(|_, start, blocks, entry| {
            let offset = start as usize * TILE_WORDS;
            let output = &mut ram[offset..offset + blocks as usize * TILE_WORDS];
            output.copy_from_slice(bytemuck::cast_slice(entry.tiles()));
        });

        if written > 0 {
            debug!(target: "tiles", "{}: committed {} entries", self.name, written);
        }
        written
    }
}

/// Shared handle to a tile bank.
#[derive(Clone)]
pub struct Tiles(Rc<RefCell<TilesBank>>);

impl Tiles {
    pub fn new(name: &'static str, blocks_count: u16) -> Self {
        Self(Rc::new(RefCell::new(TilesBank::new(name, blocks_count))))
    }

    pub fn bank(&self) -> Ref<'_, TilesBank> {
        self.0.borrow()
    }

    pub(crate) fn bank_mut(&self) -> RefMut<'_, TilesBank> {
        self.0.borrow_mut()
    }

    fn handle(&self, id: u16) -> TilesHandle {
        TilesHandle { id, tiles: self.clone() }
    }

    pub fn find(&self, item: &TilesItem) -> Option<TilesHandle> {
        let id = self.bank().find(item)?;
        self.bank_mut().increase_usage(id);
        Some(self.handle(id))
    }

    pub fn find_or_create(&self, item: &TilesItem) -> TilesHandle {
        self.try_create(item, true).or_panic()
    }

    pub fn optional_find_or_create(&self, item: &TilesItem) -> Option<TilesHandle> {
        self.try_create(item, true).optional("tiles")
    }

    pub fn create(&self, item: &TilesItem) -> TilesHandle {
        self.try_create(item, false).or_panic()
    }

    pub fn optional_create(&self, item: &TilesItem) -> Option<TilesHandle> {
        self.try_create(item, false).optional("tiles")
    }

    pub fn allocate(&self, tiles_count: u16) -> TilesHandle {
        let id = self.bank_mut().allocate(tiles_count).or_panic();
        self.handle(id)
    }

    pub fn optional_allocate(&self, tiles_count: u16) -> Option<TilesHandle> {
        let id = self.bank_mut().allocate(tiles_count).optional("tiles")?;
        Some(self.handle(id))
    }

    fn try_create(&self, item: &TilesItem, allow_dedup: bool) -> Result<TilesHandle> {
        let id = self.bank_mut().create(item, allow_dedup)?;
        Ok(self.handle(id))
    }

    pub fn used_tiles_count(&self) -> u16 {
        self.bank().used_tiles_count()
    }

    pub fn available_tiles_count(&self) -> u16 {
        self.bank().available_tiles_count()
    }

    pub fn used_items_count(&self) -> u16 {
        self.bank().used_items_count()
    }

    pub fn available_items_count(&self) -> u16 {
        self.bank().available_items_count()
    }
}

pub struct TilesHandle {
    id: u16,
    tiles: Tiles,
}

impl TilesHandle {
    pub fn id(&self) -> u16 {
        self.id
    }

    /// First tile index in tile RAM.
    pub fn start_block(&self) -> u16 {
        self.tiles.bank().start_block(self.id)
    }

    pub fn tiles_count(&self) -> u16 {
        self.tiles.bank().tiles_count(self.id)
    }

    pub fn usages(&self) -> u16 {
        self.tiles.bank().usages(self.id)
    }

    pub fn tiles_ref(&self) -> Option<SourceRef<Tile>> {
        self.tiles.bank().tiles_ref(self.id)
    }

    pub fn set_tiles_ref(&mut self, item: &TilesItem) {
        self.tiles.bank_mut().set_tiles_ref(self.id, item);
    }

    /// Writable tiles of an allocated entry. The entry is copied to tile RAM at the
    /// next commit.
    pub fn vram(&mut self) -> Option<RefMut<'_, [Tile]>> {
        let id = self.id;
        RefMut::filter_map(self.tiles.bank_mut(), |bank| bank.vram_mut(id)).ok()
    }

    pub fn reload_tiles_ref(&mut self) {
        self.tiles.bank_mut().reload_tiles_ref(self.id);
    }
}

impl Clone for TilesHandle {
    fn clone(&self) -> Self {
        self.tiles.bank_mut().increase_usage(self.id);
        Self { id: self.id, tiles: self.tiles.clone() }
    }
}

impl Drop for TilesHandle {
    fn drop(&mut self) {
        self.tiles.bank_mut().decrease_usage(self.id);
    }
}

impl PartialEq for TilesHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && Rc::ptr_eq(&self.tiles.0, &other.tiles.0)
    }
}

impl Eq for TilesHandle {}

impl Hash for TilesHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TilesHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TilesHandle").field("id", &self.id).finish()
    }
}
