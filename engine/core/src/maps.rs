//! BG map bank.
//!
//! Blocks are 32×32 cell screenblocks. Maps at least 32 cells wide and tall are laid
//! out block by block (row of blocks, then next row); narrower maps are stored
//! linearly. A map entry holds the tiles and palette it's bound to, keeping both alive,
//! and rebases committed cells on their current tile index and palette slot.

use alloc::boxed::Box;
use alloc::rc::Rc;
use alloc::vec;
use core::cell::{Ref, RefCell, RefMut};
use core::fmt;
use core::hash::{Hash, Hasher};

use bitfield::bitfield;
use bytemuck::{Pod, Zeroable};
use log::debug;
use vbank_hw::memory::MAP_BLOCK_CELLS;

use crate::config::MAX_MAP_ITEMS;
use crate::error::{Creation, Result};
use crate::palettes::{Bpp, PaletteHandle, PaletteLayer};
use crate::pool::{content_hash, ContentPool, PoolPayload};
use crate::source::SourceRef;
use crate::tiles::TilesHandle;

const BLOCK_SIDE: u16 = 32;

bitfield! {
    #[repr(transparent)]
    #[derive(Copy, Clone, Default, PartialEq, Eq, Hash)]
    pub struct MapCell(u16);
    impl Debug;
    u16;
    pub tile_index, set_tile_index: 9, 0;
    pub horizontal_flip, set_horizontal_flip: 10;
    pub vertical_flip, set_vertical_flip: 11;
    pub palette_id, set_palette_id: 15, 12;
}

unsafe impl Zeroable for MapCell {}
unsafe impl Pod for MapCell {}

impl MapCell {
    pub fn new(tile_index: u16) -> Self {
        let mut cell = MapCell(0);
        cell.set_tile_index(tile_index & 0x3FF);
        cell
    }

    pub const fn from_raw(raw: u16) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u16 {
        self.0
    }
}

/// Map widths and heights are 16, or a multiple of 32.
pub fn valid_map_dimension(value: u16) -> bool {
    value == 16 || (value >= BLOCK_SIDE && value % BLOCK_SIDE == 0)
}

pub fn valid_map_dimensions(width: u16, height: u16) -> bool {
    valid_map_dimension(width) && valid_map_dimension(height)
}

fn blocked_layout(width: u16, height: u16) -> bool {
    width >= BLOCK_SIDE && height >= BLOCK_SIDE
}

fn blocks_count(width: u16, height: u16) -> u16 {
    if blocked_layout(width, height) {
        (width / BLOCK_SIDE) * (height / BLOCK_SIDE)
    } else {
        (width as usize * height as usize).div_ceil(MAP_BLOCK_CELLS) as u16
    }
}

/// Offset of cell `(x, y)` from the map's first cell in map RAM.
fn cell_offset(x: u16, y: u16, width: u16, height: u16) -> usize {
    if blocked_layout(width, height) {
        let blocks_per_row = (width / BLOCK_SIDE) as usize;
        let block = (y / BLOCK_SIDE) as usize * blocks_per_row + (x / BLOCK_SIDE) as usize;
        block * MAP_BLOCK_CELLS + (y % BLOCK_SIDE) as usize * BLOCK_SIDE as usize + (x % BLOCK_SIDE) as usize
    } else {
        y as usize * width as usize + x as usize
    }
}

/// Cells to find or create a map with.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MapItem {
    cells: SourceRef<MapCell>,
    width: u16,
    height: u16,
}

impl MapItem {
    pub fn new(cells: SourceRef<MapCell>, width: u16, height: u16) -> Self {
        assert!(valid_map_dimension(width), "Invalid width: {width}");
        assert!(valid_map_dimension(height), "Invalid height: {height}");
        let cells_count = width as usize * height as usize;
        assert!(cells.len() >= cells_count, "Invalid cells count: {} - {}", cells.len(), cells_count);

        // SAFETY: a prefix of a valid source stays valid for as long as the source
        let cells = unsafe { SourceRef::from_raw(cells.as_ptr(), cells_count) };
        Self { cells, width, height }
    }

    pub fn from_static(cells: &'static [MapCell], width: u16, height: u16) -> Self {
        Self::new(SourceRef::from_static(cells), width, height)
    }

    pub fn cells_ref(&self) -> SourceRef<MapCell> {
        self.cells
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    pub fn blocks_count(&self) -> u16 {
        blocks_count(self.width, self.height)
    }

    fn hash(&self) -> u32 {
        content_hash(self.cells.bytes())
    }
}

/// What committed cells are rebased on: the first tile of the map's tiles entry and,
/// for 4 bits per pixel maps, its palette slot.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct MapBinding {
    pub tiles_offset: u16,
    pub palette_bank: u8,
    pub bpp: Bpp,
}

impl MapBinding {
    pub fn new(tiles: &TilesHandle, palette: &PaletteHandle) -> Self {
        let bpp = palette.bpp();
        let tiles_offset = match bpp {
            Bpp::Bpp4 => tiles.start_block(),
            Bpp::Bpp8 => tiles.start_block() / 2,
        };
        Self { tiles_offset, palette_bank: palette.hw_bank(), bpp }
    }

    fn bind(&self, mut cell: MapCell) -> MapCell {
        cell.set_tile_index((cell.tile_index() + self.tiles_offset) & 0x3FF);
        if self.bpp == Bpp::Bpp4 {
            cell.set_palette_id(self.palette_bank as u16);
        }
        cell
    }
}

fn assert_bg_palette(palette: &PaletteHandle) {
    assert!(palette.layer() == PaletteLayer::Bg, "Invalid palette layer: {:?}", palette.layer());
}

enum MapCells {
    Source(SourceRef<MapCell>),
    /// Allocated map, row by row, zeroed until written.
    Staged(Box<[MapCell]>),
}

struct MapEntry {
    cells: MapCells,
    width: u16,
    height: u16,
    tiles: TilesHandle,
    palette: PaletteHandle,
}

impl PoolPayload for MapEntry {
    fn same_content(&self, other: &Self) -> bool {
        self.width == other.width
            && self.height == other.height
            && self.tiles == other.tiles
            && self.palette == other.palette
            && match (&self.cells, &other.cells) {
                (MapCells::Source(a), MapCells::Source(b)) => a.same_content(b),
                _ => false,
            }
    }
}

impl MapEntry {
    fn from_item(item: &MapItem, tiles: &TilesHandle, palette: &PaletteHandle) -> Self {
        assert_bg_palette(palette);
        Self {
            cells: MapCells::Source(item.cells),
            width: item.width,
            height: item.height,
            tiles: tiles.clone(),
            palette: palette.clone(),
        }
    }

    fn cells_ref(&self) -> Option<SourceRef<MapCell>> {
        match &self.cells {
            MapCells::Source(cells) => Some(*cells),
            MapCells::Staged(_) => None,
        }
    }

    fn write(&self, output: &mut [u16]) {
        let cells = match &self.cells {
            MapCells::Source(cells) => cells.as_slice(),
            MapCells::Staged(cells) => &cells[..],
        };

        let binding = MapBinding::new(&self.tiles, &self.palette);
        for y in 0..self.height {
            for x in 0..self.width {
                let cell = cells[y as usize * self.width as usize + x as usize];
                output[cell_offset(x, y, self.width, self.height)] = binding.bind(cell).raw();
            }
        }
    }
}

pub struct MapsBank {
    pool: ContentPool<MapEntry, MAX_MAP_ITEMS>,
}

impl MapsBank {
    pub fn new(blocks_count: u16) -> Self {
        Self { pool: ContentPool::new("BG maps", blocks_count) }
    }

    pub fn find(&self, item: &MapItem, tiles: &TilesHandle, palette: &PaletteHandle) -> Option<u16> {
        self.pool.find(item.hash(), &MapEntry::from_item(item, tiles, palette))
    }

    pub fn create(
        &mut self,
        item: &MapItem,
        tiles: &TilesHandle,
        palette: &PaletteHandle,
        allow_dedup: bool,
    ) -> Result<u16> {
        let entry = MapEntry::from_item(item, tiles, palette);
        let id = self.pool.create(item.blocks_count(), item.hash(), entry, allow_dedup)?;
        debug!(target: "maps", "map {} ({}x{}, {} blocks)", id, item.width, item.height, item.blocks_count());
        Ok(id)
    }

    pub fn allocate(&mut self, width: u16, height: u16, tiles: &TilesHandle, palette: &PaletteHandle) -> Result<u16> {
        assert!(valid_map_dimension(width), "Invalid width: {width}");
        assert!(valid_map_dimension(height), "Invalid height: {height}");
        assert_bg_palette(palette);

        let staging = vec![MapCell::default(); width as usize * height as usize].into_boxed_slice();
        let entry = MapEntry {
            cells: MapCells::Staged(staging),
            width,
            height,
            tiles: tiles.clone(),
            palette: palette.clone(),
        };
        let id = self.pool.create(blocks_count(width, height), 0, entry, false)?;
        debug!(target: "maps", "map {} allocated ({}x{})", id, width, height);
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

    /// Screenblock of the map's first cell.
    pub fn start_block(&self, id: u16) -> u16 {
        self.pool.start_block(id)
    }

    pub fn dimensions(&self, id: u16) -> (u16, u16) {
        let entry = self.pool.payload(id);
        (entry.width, entry.height)
    }

    pub fn binding(&self, id: u16) -> MapBinding {
        let entry = self.pool.payload(id);
        MapBinding::new(&entry.tiles, &entry.palette)
    }

    pub fn tiles(&self, id: u16) -> &TilesHandle {
        &self.pool.payload(id).tiles
    }

    pub fn palette(&self, id: u16) -> &PaletteHandle {
        &self.pool.payload(id).palette
    }

    /// Rebinds the map to other tiles; the previous ones lose a usage.
    pub fn set_tiles(&mut self, id: u16, tiles: &TilesHandle) {
        self.pool.update_payload(id, |entry| entry.tiles = tiles.clone());
    }

    /// Rebinds the map to another BG palette; the previous one loses a usage.
    pub fn set_palette(&mut self, id: u16, palette: &PaletteHandle) {
        assert_bg_palette(palette);
        self.pool.update_payload(id, |entry| entry.palette = palette.clone());
    }

    pub fn cells_ref(&self, id: u16) -> Option<SourceRef<MapCell>> {
        self.pool.payload(id).cells_ref()
    }

    /// Staging cells of an allocated map, row by row, committed like referenced
    /// cells at the next commit. `None` for maps referencing source cells.
    pub fn vram_mut(&mut self, id: u16) -> Option<&mut [MapCell]> {
        if self.cells_ref(id).is_some() {
            return None;
        }

        match &mut self.pool.payload_mut(id).cells {
            MapCells::Staged(cells) => Some(&mut cells[..]),
            MapCells::Source(_) => None,
        }
    }

    /// Points the map at other cells taking the same number of blocks.
    pub fn set_cells_ref(&mut self, id: u16, item: &MapItem) {
        assert!(
            item.blocks_count() == self.pool.item_blocks(id),
            "Invalid blocks count: {} - {}", item.blocks_count(), self.pool.item_blocks(id)
        );
        self.pool.update_payload(id, |entry| {
            entry.cells = MapCells::Source(item.cells);
            entry.width = item.width;
            entry.height = item.height;
        });
        self.pool.set_hash(id, item.hash());
    }

    pub fn reload_cells_ref(&mut self, id: u16) {
        let hash = self.cells_ref(id).map_or(0, |cells| content_hash(cells.bytes()));
        self.pool.set_hash(id, hash);
        self.pool.set_dirty(id);
    }

    pub fn used_cells_count(&self) -> usize {
        self.pool.used_blocks_count() as usize * MAP_BLOCK_CELLS
    }

    pub fn available_cells_count(&self) -> usize {
        self.pool.available_blocks_count() as usize * MAP_BLOCK_CELLS
    }

    pub fn used_blocks_count(&self) -> u16 {
        self.pool.used_blocks_count()
    }

    pub fn available_blocks_count(&self) -> u16 {
        self.pool.available_blocks_count()
    }

    pub fn used_items_count(&self) -> u16 {
        self.pool.used_items_count()
    }

    pub fn available_items_count(&self) -> u16 {
        self.pool.available_items_count()
    }

    /// Copies dirty maps to map RAM. Returns the number of maps written.
    pub fn commit(&mut self, ram: &mut [u16]) -> usize {
        let written = self.pool.commit(|_, start, blocks, entry| {
            let offset = start as usize * MAP_BLOCK_CELLS;
            entry.write(&mut ram[offset..offset + blocks as usize * MAP_BLOCK_CELLS]);
        });

        if written > 0 {
            debug!(target: "maps", "committed {} maps", written);
        }
        written
    }
}

/// Shared handle to the BG map bank.
#[derive(Clone)]
pub struct Maps(Rc<RefCell<MapsBank>>);

impl Maps {
    pub fn new(blocks_count: u16) -> Self {
        Self(Rc::new(RefCell::new(MapsBank::new(blocks_count))))
    }

    pub fn bank(&self) -> Ref<'_, MapsBank> {
        self.0.borrow()
    }

    pub(crate) fn bank_mut(&self) -> RefMut<'_, MapsBank> {
        self.0.borrow_mut()
    }

    fn handle(&self, id: u16) -> MapHandle {
        MapHandle { id, maps: self.clone() }
    }

    pub fn find(&self, item: &MapItem, tiles: &TilesHandle, palette: &PaletteHandle) -> Option<MapHandle> {
        let id = self.bank().find(item, tiles, palette)?;
        self.bank_mut().increase_usage(id);
        Some(self.handle(id))
    }

    pub fn find_or_create(&self, item: &MapItem, tiles: &TilesHandle, palette: &PaletteHandle) -> MapHandle {
        self.try_create(item, tiles, palette, true).or_panic()
    }

    pub fn optional_find_or_create(
        &self,
        item: &MapItem,
        tiles: &TilesHandle,
        palette: &PaletteHandle,
    ) -> Option<MapHandle> {
        self.try_create(item, tiles, palette, true).optional("maps")
    }

    pub fn create(&self, item: &MapItem, tiles: &TilesHandle, palette: &PaletteHandle) -> MapHandle {
        self.try_create(item, tiles, palette, false).or_panic()
    }

    pub fn optional_create(&self, item: &MapItem, tiles: &TilesHandle, palette: &PaletteHandle) -> Option<MapHandle> {
        self.try_create(item, tiles, palette, false).optional("maps")
    }

    /// Map without source cells, written through [`MapHandle::vram`].
    pub fn allocate(&self, width: u16, height: u16, tiles: &TilesHandle, palette: &PaletteHandle) -> MapHandle {
        let id = self.bank_mut().allocate(width, height, tiles, palette).or_panic();
        self.handle(id)
    }

    pub fn optional_allocate(
        &self,
        width: u16,
        height: u16,
        tiles: &TilesHandle,
        palette: &PaletteHandle,
    ) -> Option<MapHandle> {
        let id = self.bank_mut().allocate(width, height, tiles, palette).optional("maps")?;
        Some(self.handle(id))
    }

    fn try_create(
        &self,
        item: &MapItem,
        tiles: &TilesHandle,
        palette: &PaletteHandle,
        allow_dedup: bool,
    ) -> Result<MapHandle> {
        let id = self.bank_mut().create(item, tiles, palette, allow_dedup)?;
        Ok(self.handle(id))
    }

    pub fn used_cells_count(&self) -> usize {
        self.bank().used_cells_count()
    }

    pub fn available_cells_count(&self) -> usize {
        self.bank().available_cells_count()
    }

    pub fn used_blocks_count(&self) -> u16 {
        self.bank().used_blocks_count()
    }

    pub fn available_blocks_count(&self) -> u16 {
        self.bank().available_blocks_count()
    }

    pub fn used_items_count(&self) -> u16 {
        self.bank().used_items_count()
    }

    pub fn available_items_count(&self) -> u16 {
        self.bank().available_items_count()
    }
}

pub struct MapHandle {
    id: u16,
    maps: Maps,
}

impl MapHandle {
    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn start_block(&self) -> u16 {
        self.maps.bank().start_block(self.id)
    }

    pub fn dimensions(&self) -> (u16, u16) {
        self.maps.bank().dimensions(self.id)
    }

    pub fn usages(&self) -> u16 {
        self.maps.bank().usages(self.id)
    }

    pub fn binding(&self) -> MapBinding {
        self.maps.bank().binding(self.id)
    }

    pub fn tiles(&self) -> TilesHandle {
        self.maps.bank().tiles(self.id).clone()
    }

    pub fn set_tiles(&mut self, tiles: &TilesHandle) {
        self.maps.bank_mut().set_tiles(self.id, tiles);
    }

    pub fn palette(&self) -> PaletteHandle {
        self.maps.bank().palette(self.id).clone()
    }

    pub fn set_palette(&mut self, palette: &PaletteHandle) {
        self.maps.bank_mut().set_palette(self.id, palette);
    }

    pub fn cells_ref(&self) -> Option<SourceRef<MapCell>> {
        self.maps.bank().cells_ref(self.id)
    }

    /// Writable cells of an allocated map, row by row, with tile indexes relative to
    /// the map's tiles. Committed at the next commit.
    pub fn vram(&mut self) -> Option<RefMut<'_, [MapCell]>> {
        let id = self.id;
        RefMut::filter_map(self.maps.bank_mut(), |bank| bank.vram_mut(id)).ok()
    }

    pub fn set_cells_ref(&mut self, item: &MapItem) {
        self.maps.bank_mut().set_cells_ref(self.id, item);
    }

    pub fn reload_cells_ref(&mut self) {
        self.maps.bank_mut().reload_cells_ref(self.id);
    }
}

impl Clone for MapHandle {
    fn clone(&self) -> Self {
        self.maps.bank_mut().increase_usage(self.id);
        Self { id: self.id, maps: self.maps.clone() }
    }
}

impl Drop for MapHandle {
    fn drop(&mut self) {
        self.maps.bank_mut().decrease_usage(self.id);
    }
}

impl PartialEq for MapHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && Rc::ptr_eq(&self.maps.0, &other.maps.0)
    }
}

impl Eq for MapHandle {}

impl Hash for MapHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for MapHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapHandle").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Color;
    use crate::palettes::{PaletteItem, Palettes};
    use crate::tiles::{Tile, Tiles, TilesItem};

    static TILES: [Tile; 10] = [Tile([1; 16]); 10];
    static OTHER_TILES: [Tile; 10] = [Tile([2; 16]); 10];
    static COLORS: [Color; 4] = [Color::WHITE; 4];

    struct Fixture {
        tiles: Tiles,
        palettes: Palettes,
    }

    impl Fixture {
        fn new() -> Self {
            Self { tiles: Tiles::new("bg tiles", 64), palettes: Palettes::new(PaletteLayer::Bg) }
        }

        fn tiles(&self, tiles: &'static [Tile]) -> TilesHandle {
            self.tiles.create(&TilesItem::from_static(tiles))
        }

        fn palette(&self) -> PaletteHandle {
            self.palettes.create(&PaletteItem::new(&COLORS, Bpp::Bpp4))
        }
    }

    fn leak_cells(count: usize) -> &'static [MapCell] {
        let cells: alloc::vec::Vec<MapCell> = (0..count).map(|index| MapCell::new((index % 1024) as u16)).collect();
        alloc::boxed::Box::leak(cells.into_boxed_slice())
    }

    #[test]
    fn dimension_rule() {
        assert!(valid_map_dimensions(16, 16));
        assert!(valid_map_dimensions(32, 32));
        assert!(valid_map_dimensions(64, 32));
        assert!(!valid_map_dimensions(17, 16));
        assert!(!valid_map_dimensions(20, 20));
        assert!(!valid_map_dimensions(0, 32));
        assert!(!valid_map_dimensions(48, 32));
    }

    #[test]
    #[should_panic(expected = "Invalid width")]
    fn item_rejects_invalid_width() {
        MapItem::from_static(leak_cells(20 * 16), 20, 16);
    }

    #[test]
    fn cell_fields() {
        let mut cell = MapCell::new(1023);
        cell.set_horizontal_flip(true);
        cell.set_palette_id(15);
        assert_eq!(cell.raw(), 0x3FF | 1 << 10 | 0xF << 12);
    }

    #[test]
    fn blocks_follow_the_layout() {
        assert_eq!(blocks_count(16, 16), 1);
        assert_eq!(blocks_count(32, 32), 1);
        assert_eq!(blocks_count(64, 32), 2);
        assert_eq!(blocks_count(64, 64), 4);
        assert_eq!(blocks_count(16, 128), 2);
        assert_eq!(cell_offset(32, 0, 64, 32), MAP_BLOCK_CELLS);
        assert_eq!(cell_offset(1, 1, 64, 32), 33);
        assert_eq!(cell_offset(0, 32, 64, 64), 2 * MAP_BLOCK_CELLS);
    }

    #[test]
    fn commit_rebases_cells() {
        let fixture = Fixture::new();
        let _padding = fixture.tiles(&OTHER_TILES);
        let tiles = fixture.tiles(&TILES);
        let _padding_palettes = [fixture.palette(), fixture.palette(), fixture.palette()];
        let palette = fixture.palette();

        let maps = Maps::new(8);
        let cells = leak_cells(64 * 32);
        let map = maps.create(&MapItem::from_static(cells, 64, 32), &tiles, &palette);
        assert_eq!(map.start_block(), 0);
        assert_eq!(maps.used_blocks_count(), 2);
        assert_eq!(maps.used_cells_count(), 2 * MAP_BLOCK_CELLS);
        assert_eq!(map.binding(), MapBinding { tiles_offset: 10, palette_bank: 3, bpp: Bpp::Bpp4 });

        let mut ram = alloc::vec![0u16; 8 * MAP_BLOCK_CELLS];
        maps.bank_mut().commit(&mut ram);

        // cell (33, 0) is the 34th of the first row and lands in the second block
        let cell = MapCell(ram[MAP_BLOCK_CELLS + 1]);
        assert_eq!(cell.tile_index(), 33 + 10);
        assert_eq!(cell.palette_id(), 3);
    }

    #[test]
    fn bindings_split_dedup() {
        let fixture = Fixture::new();
        let tiles = fixture.tiles(&TILES);
        let other_tiles = fixture.tiles(&OTHER_TILES);
        let palette = fixture.palette();

        let maps = Maps::new(8);
        let cells = leak_cells(32 * 32);
        let item = MapItem::from_static(cells, 32, 32);
        let a = maps.find_or_create(&item, &tiles, &palette);
        let b = maps.find_or_create(&item, &tiles, &palette);
        let c = maps.find_or_create(&item, &other_tiles, &palette);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(maps.used_items_count(), 2);
        assert_eq!(maps.find(&item, &other_tiles, &palette), Some(c));
    }

    #[test]
    fn maps_keep_their_tiles_and_palette() {
        let fixture = Fixture::new();
        let maps = Maps::new(8);
        let tiles = fixture.tiles(&TILES);
        let palette = fixture.palette();
        let mut map = maps.create(&MapItem::from_static(leak_cells(32 * 32), 32, 32), &tiles, &palette);
        assert_eq!(palette.usages(), 2);

        drop(tiles);
        drop(palette);
        assert_eq!(fixture.tiles.used_items_count(), 1);
        assert_eq!(fixture.palettes.used_slots_count(), 1);

        let other = fixture.palette();
        assert_ne!(other.hw_bank(), map.palette().hw_bank());

        map.set_palette(&other);
        assert_eq!(map.palette(), other);
        assert_eq!(fixture.palettes.used_slots_count(), 1);

        drop(map);
        assert_eq!(fixture.tiles.used_items_count(), 0);
        assert_eq!(other.usages(), 1);
    }

    #[test]
    fn rebinding_rewrites_the_cells() {
        let fixture = Fixture::new();
        let tiles = fixture.tiles(&TILES);
        let palette = fixture.palette();
        let maps = Maps::new(8);
        let mut map = maps.create(&MapItem::from_static(leak_cells(16 * 16), 16, 16), &tiles, &palette);

        let mut ram = alloc::vec![0u16; 8 * MAP_BLOCK_CELLS];
        assert_eq!(maps.bank_mut().commit(&mut ram), 1);
        assert_eq!(maps.bank_mut().commit(&mut ram), 0);

        let moved = fixture.tiles(&OTHER_TILES);
        map.set_tiles(&moved);
        assert_eq!(tiles.usages(), 1);
        assert_eq!(maps.bank_mut().commit(&mut ram), 1);
        assert_eq!(MapCell(ram[5]).tile_index(), 5 + 10);
    }

    #[test]
    #[should_panic(expected = "Invalid palette layer")]
    fn sprite_palettes_are_rejected() {
        let fixture = Fixture::new();
        let tiles = fixture.tiles(&TILES);
        let palette = Palettes::new(PaletteLayer::Sprites).create(&PaletteItem::new(&COLORS, Bpp::Bpp4));
        Maps::new(8).create(&MapItem::from_static(leak_cells(16 * 16), 16, 16), &tiles, &palette);
    }

    #[test]
    fn allocated_maps_are_written_through_vram() {
        let fixture = Fixture::new();
        let _padding = fixture.tiles(&OTHER_TILES);
        let tiles = fixture.tiles(&TILES);
        let palette = fixture.palette();
        let maps = Maps::new(8);
        let mut map = maps.allocate(64, 32, &tiles, &palette);
        assert!(map.cells_ref().is_none());

        map.vram().unwrap()[33] = MapCell::new(2);
        let mut ram = alloc::vec![0xFFFFu16; 8 * MAP_BLOCK_CELLS];
        assert_eq!(maps.bank_mut().commit(&mut ram), 1);

        // cell (33, 0) of a 64 cells wide map
        assert_eq!(MapCell(ram[MAP_BLOCK_CELLS + 1]).tile_index(), 12);
        assert_eq!(MapCell(ram[0]).tile_index(), 10);
        assert_eq!(ram[2 * MAP_BLOCK_CELLS], 0xFFFF);

        let mut sourced = maps.create(&MapItem::from_static(leak_cells(16 * 16), 16, 16), &tiles, &palette);
        assert!(sourced.vram().is_none());
    }

    #[test]
    fn capacity_queries() {
        let fixture = Fixture::new();
        let tiles = fixture.tiles(&TILES);
        let palette = fixture.palette();
        let maps = Maps::new(4);
        let _map = maps.allocate(32, 32, &tiles, &palette);
        assert_eq!(maps.used_blocks_count(), 1);
        assert_eq!(maps.available_blocks_count(), 3);
        assert_eq!(maps.available_cells_count(), 3 * MAP_BLOCK_CELLS);
        assert!(maps.optional_allocate(64, 64, &tiles, &palette).is_none());
        assert_eq!(maps.used_blocks_count(), 1);
    }
}
