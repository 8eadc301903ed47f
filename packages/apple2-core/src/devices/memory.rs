//! The banked/paged 64 KiB address space: 256 read-page and 256 write-page
//! handles over a handful of physical buffers, recomputed whenever a
//! soft-switch flips a bit in `MemoryState`.

use super::bus::BusPeekResult;

pub const PAGE_SIZE: usize = 256;
pub const NUM_PAGES: usize = 256;

pub const MAIN_RAM_SIZE: usize = 0xC000; // 48 KiB, $0000-$BFFF
pub const MAIN_ROM_SIZE: usize = 0x4000; // 16 KiB, $C000-$FFFF
pub const INTERNAL_ROM_SIZE: usize = 0x1000; // 4 KiB shadow, $C000-$CFFF
pub const LC_BANK_SIZE: usize = 0x1000; // 4 KiB, $D000-$DFFF
pub const EXT_RAM_SIZE: usize = 0x2000; // 8 KiB, $E000-$FFFF
pub const EXPANSION_ROM_SIZE: usize = 0x800; // 2 KiB, $C800-$CFFF

bitflags! {
    pub struct MemoryState: u32 {
        const STORE_80         = 0x0001;
        const AUX_READ         = 0x0002;
        const AUX_WRITE        = 0x0004;
        const ALT_ZP           = 0x0008;
        const SLOTCX_ROM       = 0x0010;
        const SLOTC3_ROM       = 0x0020;
        const LC_BANK2         = 0x0040;
        const LC_READ          = 0x0080;
        const LC_WRITE_PROTECT = 0x0100;
        const EXPANSION_RESET  = 0x0200;
    }
}

/// Which physical buffer a page table entry aliases.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum BufferId {
    MainRam,
    AuxRam,
    MainRom,
    InternalRom,
    MainLcBank1,
    MainLcBank2,
    AuxLcBank1,
    AuxLcBank2,
    MainExtRam,
    AuxExtRam,
    ExpansionRom(u8),
    /// Reads past the end of a recognized region fall back to the floating
    /// bus; writes to it are dropped.
    Unmapped,
}

/// A 256-byte page handle: which buffer backs it, at what page offset within
/// that buffer, and (for the write side) whether stores are permitted.
#[derive(Debug, Copy, Clone)]
pub struct PageHandle {
    pub buffer: BufferId,
    pub page_in_buffer: u8,
    pub writable: bool,
}

impl PageHandle {
    const fn unmapped() -> PageHandle {
        PageHandle {
            buffer: BufferId::Unmapped,
            page_in_buffer: 0,
            writable: false,
        }
    }
}

/// Owns every physical memory buffer and the 256-entry read/write page
/// tables that alias them. Soft-switch handlers flip bits in `state` and
/// then call `set_paging_tables()`; the CPU core never touches this type
/// directly except through `read`/`write`.
pub struct MemoryMap {
    pub state: MemoryState,
    pub video_page2: bool,
    pub video_hires: bool,

    pub main_ram: Vec<u8>,
    pub aux_ram: Vec<u8>,
    pub main_rom: Vec<u8>,
    pub internal_rom: Vec<u8>,
    pub main_lc_bank1: Vec<u8>,
    pub main_lc_bank2: Vec<u8>,
    pub aux_lc_bank1: Vec<u8>,
    pub aux_lc_bank2: Vec<u8>,
    pub main_ext_ram: Vec<u8>,
    pub aux_ext_ram: Vec<u8>,
    /// Per-slot (index 1..7) optional 2 KiB expansion ROM.
    pub expansion_rom: [Option<Vec<u8>>; 8],

    read_pages: [PageHandle; NUM_PAGES],
    write_pages: [PageHandle; NUM_PAGES],

    /// Which slot's expansion ROM (if any) is currently latched into
    /// $C800-$CFFF, per the read-latch rule in 4.3.
    cx_latch: Option<u8>,

    /// Per-page "last known opcode" cache so a disassembler can tell known
    /// code from data; any write to an offset invalidates its entry.
    last_opcode: Vec<[Option<u8>; PAGE_SIZE]>,

    last_bus_value: u8,
}

/// Apple ][ power-on RAM has a well known "every 4th byte-pair is $FF"
/// pattern left by the self-test ROM; faithful emulators seed RAM with it
/// rather than all zeroes so early memory-dependent bugs behave the same.
fn poweron_pattern(size: usize) -> Vec<u8> {
    let mut buf = vec![0u8; size];
    for chunk in buf.chunks_mut(4).skip(1).step_by(2) {
        for b in chunk {
            *b = 0xFF;
        }
    }
    buf
}

impl MemoryMap {
    pub fn new(main_rom: Vec<u8>, internal_rom: Vec<u8>, has_aux: bool) -> MemoryMap {
        let mut map = MemoryMap {
            state: MemoryState::from_bits_truncate(0),
            video_page2: false,
            video_hires: false,
            main_ram: poweron_pattern(MAIN_RAM_SIZE),
            aux_ram: if has_aux { poweron_pattern(MAIN_RAM_SIZE) } else { vec![0; MAIN_RAM_SIZE] },
            main_rom,
            internal_rom,
            main_lc_bank1: vec![0; LC_BANK_SIZE],
            main_lc_bank2: vec![0; LC_BANK_SIZE],
            aux_lc_bank1: vec![0; LC_BANK_SIZE],
            aux_lc_bank2: vec![0; LC_BANK_SIZE],
            main_ext_ram: vec![0; EXT_RAM_SIZE],
            aux_ext_ram: vec![0; EXT_RAM_SIZE],
            expansion_rom: Default::default(),
            read_pages: [PageHandle::unmapped(); NUM_PAGES],
            write_pages: [PageHandle::unmapped(); NUM_PAGES],
            cx_latch: None,
            last_opcode: vec![[None; PAGE_SIZE]; NUM_PAGES],
            last_bus_value: 0,
        };
        map.set_paging_tables();
        map
    }

    fn buffer(&self, id: BufferId) -> Option<&[u8]> {
        match id {
            BufferId::MainRam => Some(&self.main_ram),
            BufferId::AuxRam => Some(&self.aux_ram),
            BufferId::MainRom => Some(&self.main_rom),
            BufferId::InternalRom => Some(&self.internal_rom),
            BufferId::MainLcBank1 => Some(&self.main_lc_bank1),
            BufferId::MainLcBank2 => Some(&self.main_lc_bank2),
            BufferId::AuxLcBank1 => Some(&self.aux_lc_bank1),
            BufferId::AuxLcBank2 => Some(&self.aux_lc_bank2),
            BufferId::MainExtRam => Some(&self.main_ext_ram),
            BufferId::AuxExtRam => Some(&self.aux_ext_ram),
            BufferId::ExpansionRom(slot) => self.expansion_rom[slot as usize].as_deref(),
            BufferId::Unmapped => None,
        }
    }

    fn buffer_mut(&mut self, id: BufferId) -> Option<&mut [u8]> {
        match id {
            BufferId::MainRam => Some(&mut self.main_ram),
            BufferId::AuxRam => Some(&mut self.aux_ram),
            BufferId::MainRom => Some(&mut self.main_rom),
            BufferId::InternalRom => Some(&mut self.internal_rom),
            BufferId::MainLcBank1 => Some(&mut self.main_lc_bank1),
            BufferId::MainLcBank2 => Some(&mut self.main_lc_bank2),
            BufferId::AuxLcBank1 => Some(&mut self.aux_lc_bank1),
            BufferId::AuxLcBank2 => Some(&mut self.aux_lc_bank2),
            BufferId::MainExtRam => Some(&mut self.main_ext_ram),
            BufferId::AuxExtRam => Some(&mut self.aux_ext_ram),
            BufferId::ExpansionRom(slot) => self.expansion_rom[slot as usize].as_deref_mut(),
            BufferId::Unmapped => None,
        }
    }

    /// Recompute the 256-entry read and write page tables from `state` (plus
    /// the video PAGE2/HIRES flags), per the ordered rules in section 4.3.
    pub fn set_paging_tables(&mut self) {
        for page in 0..NUM_PAGES {
            let (read, write) = self.resolve_page(page as u8);
            self.read_pages[page] = read;
            self.write_pages[page] = write;
        }
    }

    fn resolve_page(&self, page: u8) -> (PageHandle, PageHandle) {
        // Rule 1: zero page + stack.
        if page <= 0x01 {
            let buf = if self.state.contains(MemoryState::ALT_ZP) { BufferId::AuxRam } else { BufferId::MainRam };
            let handle = PageHandle { buffer: buf, page_in_buffer: page, writable: true };
            return (handle, handle);
        }

        // Rule 2: general RAM, subject to rule 6's 80STORE aliasing below.
        if page <= 0xBF {
            let read_buf = if self.state.contains(MemoryState::AUX_READ) { BufferId::AuxRam } else { BufferId::MainRam };
            let write_buf = if self.state.contains(MemoryState::AUX_WRITE) { BufferId::AuxRam } else { BufferId::MainRam };
            let mut read = PageHandle { buffer: read_buf, page_in_buffer: page, writable: true };
            let mut write = PageHandle { buffer: write_buf, page_in_buffer: page, writable: true };

            // Rule 6: 80STORE aliases text page 1 (and, under HIRES, the
            // hi-res page) to PAGE2 regardless of AUX_READ/AUX_WRITE.
            let in_text_page1 = (0x04..=0x07).contains(&page);
            let in_hires_page = self.video_hires && (0x20..=0x3F).contains(&page);
            if self.state.contains(MemoryState::STORE_80) && (in_text_page1 || in_hires_page) {
                let buf = if self.video_page2 { BufferId::AuxRam } else { BufferId::MainRam };
                read = PageHandle { buffer: buf, page_in_buffer: page, writable: true };
                write = PageHandle { buffer: buf, page_in_buffer: page, writable: true };
            }
            return (read, write);
        }

        // Rule 3: $C0-$CF is ROM (or per-slot expansion ROM), never RAM.
        if page <= 0xCF {
            if page == 0xC3 && !self.state.contains(MemoryState::SLOTC3_ROM) {
                let handle = PageHandle { buffer: BufferId::InternalRom, page_in_buffer: page - 0xC0, writable: false };
                return (handle, PageHandle::unmapped());
            }
            if (0xC8..=0xCF).contains(&page) {
                if let Some(slot) = self.cx_latch {
                    if self.expansion_rom[slot as usize].is_some() {
                        let handle = PageHandle { buffer: BufferId::ExpansionRom(slot), page_in_buffer: page - 0xC8, writable: false };
                        return (handle, PageHandle::unmapped());
                    }
                }
            }
            if (0xC1..=0xC7).contains(&page) {
                let slot = page - 0xC0;
                if self.expansion_rom[slot as usize].is_some() {
                    let handle = PageHandle { buffer: BufferId::ExpansionRom(slot), page_in_buffer: 0, writable: false };
                    return (handle, PageHandle::unmapped());
                }
            }
            let buf = if self.state.contains(MemoryState::SLOTCX_ROM) { BufferId::MainRom } else { BufferId::InternalRom };
            let handle = PageHandle { buffer: buf, page_in_buffer: page - 0xC0, writable: false };
            return (handle, PageHandle::unmapped());
        }

        // Rule 4: language-card 4 KiB window.
        if page <= 0xDF {
            if !self.state.contains(MemoryState::LC_READ) {
                let handle = PageHandle { buffer: BufferId::MainRom, page_in_buffer: page - 0xC0, writable: false };
                let write = self.lc_write_handle(page, 0xD0, BufferId::MainLcBank1, BufferId::MainLcBank2, BufferId::AuxLcBank1, BufferId::AuxLcBank2);
                return (handle, write);
            }
            let bank2 = self.state.contains(MemoryState::LC_BANK2);
            let aux = self.state.contains(MemoryState::ALT_ZP);
            let buf = match (aux, bank2) {
                (false, true) => BufferId::MainLcBank2,
                (false, false) => BufferId::MainLcBank1,
                (true, true) => BufferId::AuxLcBank2,
                (true, false) => BufferId::AuxLcBank1,
            };
            let read = PageHandle { buffer: buf, page_in_buffer: page - 0xD0, writable: true };
            let write = self.lc_write_handle(page, 0xD0, BufferId::MainLcBank1, BufferId::MainLcBank2, BufferId::AuxLcBank1, BufferId::AuxLcBank2);
            return (read, write);
        }

        // Rule 5: language-card 8 KiB extension, analogous to rule 4 over
        // extended RAM instead of the banked 4 KiB window.
        if !self.state.contains(MemoryState::LC_READ) {
            let handle = PageHandle { buffer: BufferId::MainRom, page_in_buffer: page - 0xC0, writable: false };
            let write = self.lc_write_handle(page, 0xE0, BufferId::MainExtRam, BufferId::MainExtRam, BufferId::AuxExtRam, BufferId::AuxExtRam);
            return (handle, write);
        }
        let aux = self.state.contains(MemoryState::ALT_ZP);
        let buf = if aux { BufferId::AuxExtRam } else { BufferId::MainExtRam };
        let read = PageHandle { buffer: buf, page_in_buffer: page - 0xE0, writable: true };
        let write = self.lc_write_handle(page, 0xE0, BufferId::MainExtRam, BufferId::MainExtRam, BufferId::AuxExtRam, BufferId::AuxExtRam);
        (read, write)
    }

    fn lc_write_handle(&self, page: u8, base: u8, main_bank1: BufferId, main_bank2: BufferId, aux_bank1: BufferId, aux_bank2: BufferId) -> PageHandle {
        if self.state.contains(MemoryState::LC_WRITE_PROTECT) {
            return PageHandle::unmapped();
        }
        let bank2 = self.state.contains(MemoryState::LC_BANK2);
        let aux = self.state.contains(MemoryState::ALT_ZP);
        let buf = match (aux, bank2) {
            (false, true) => main_bank2,
            (false, false) => main_bank1,
            (true, true) => aux_bank2,
            (true, false) => aux_bank1,
        };
        PageHandle { buffer: buf, page_in_buffer: page - base, writable: true }
    }

    /// Records that a read touched $C1xx-$C7xx, latching that slot's
    /// expansion ROM in at $C800-$CFFF on the next access. A read of $CFFF
    /// resets the latch to the internal ROM.
    pub fn note_cx_access(&mut self, addr: u16) {
        let page = (addr >> 8) as u8;
        let new_latch = if (0xC1..=0xC7).contains(&page) {
            Some(page - 0xC0)
        } else if addr == 0xCFFF {
            None
        } else {
            self.cx_latch
        };
        if new_latch != self.cx_latch {
            self.cx_latch = new_latch;
            self.set_paging_tables();
        }
    }

    pub fn read(&mut self, addr: u16) -> u8 {
        self.note_cx_access(addr);
        let page = self.read_pages[(addr >> 8) as usize];
        let offset = addr as usize & 0xFF;
        let val = self
            .buffer(page.buffer)
            .map(|b| b[page.page_in_buffer as usize * PAGE_SIZE + offset])
            .unwrap_or(self.last_bus_value);
        self.last_bus_value = val;
        val
    }

    pub fn read_instruction(&mut self, addr: u16) -> u8 {
        let val = self.read(addr);
        self.last_opcode[(addr >> 8) as usize][addr as usize & 0xFF] = Some(val);
        val
    }

    pub fn peek(&self, addr: u16) -> BusPeekResult {
        let page = self.read_pages[(addr >> 8) as usize];
        let offset = addr as usize & 0xFF;
        match self.buffer(page.buffer) {
            Some(b) => BusPeekResult::Result(b[page.page_in_buffer as usize * PAGE_SIZE + offset]),
            None => BusPeekResult::Unmapped,
        }
    }

    pub fn write(&mut self, addr: u16, data: u8) {
        self.note_cx_access(addr);
        let page = self.write_pages[(addr >> 8) as usize];
        let offset = addr as usize & 0xFF;
        if !page.writable {
            return;
        }
        if let Some(buf) = self.buffer_mut(page.buffer) {
            buf[page.page_in_buffer as usize * PAGE_SIZE + offset] = data;
        }
        self.last_opcode[(addr >> 8) as usize][offset] = None;
        self.last_bus_value = data;
    }

    /// Approximates the video scanner's current byte. A full scanline model
    /// is out of scope; this returns the last byte that crossed the bus,
    /// which is what most floating-bus-reading software actually observes.
    pub fn read_floating_bus(&self) -> u8 {
        self.last_bus_value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_map() -> MemoryMap {
        MemoryMap::new(vec![0xEA; MAIN_ROM_SIZE], vec![0xEA; INTERNAL_ROM_SIZE], true)
    }

    #[test]
    fn zero_page_follows_alt_zp() {
        let mut map = test_map();
        map.write(0x0010, 0x42);
        assert_eq!(map.read(0x0010), 0x42);
        map.state.insert(MemoryState::ALT_ZP);
        map.set_paging_tables();
        assert_ne!(map.read(0x0010), 0x42);
    }

    #[test]
    fn write_protected_page_drops_writes() {
        let mut map = test_map();
        // $C000-$CFFF with SLOTCX_ROM unset maps to the write-protected
        // internal ROM shadow.
        map.write(0xC100, 0x77);
        assert_eq!(map.read(0xC100), 0xEA);
    }

    #[test]
    fn store_80_aliases_text_page1_to_page2() {
        let mut map = test_map();
        map.state.insert(MemoryState::STORE_80);
        map.video_page2 = true;
        map.set_paging_tables();
        map.write(0x0400, 0x55);
        map.video_page2 = false;
        map.set_paging_tables();
        assert_ne!(map.read(0x0400), 0x55);
    }
}
