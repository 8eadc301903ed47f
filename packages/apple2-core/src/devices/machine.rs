//! The `Machine` aggregate: the single non-global mutable root that owns the
//! CPU, the paged memory map, and every piece of state reachable only through
//! a $C000-$C0FF soft switch (keyboard, video flags, speaker, paddles, the
//! language-card bank-select latch, and up to seven slots of peripheral I/O).
//!
//! It implements `Motherboard` so the CPU core can drive it, and it is the
//! only place that decides how an access to $C000-$C0FF gets dispatched.

use log::trace;

use super::bus::Motherboard;
use super::cpu::{Cpu6502, CpuVariant, OpcodePolicy, WithCpu};
use super::disk::DiskController;
use super::io::{Keyboard, Paddles, Speaker, VideoFlags};
use super::memory::{MemoryMap, MemoryState};

/// Number of peripheral slots, 1..7; index 0 of `disks` is reserved for the
/// slot-0 language-card soft switches and never holds a controller.
const NUM_SLOTS: usize = 8;

/// Tracks the "two consecutive reads of the same write-enable switch" rule
/// for the language-card soft switches at $C080-$C08F.
#[derive(Debug, Clone, Copy, Default)]
struct LcAccess {
    /// The write-enable-eligible switch (masked to ignore the don't-care
    /// bit 2) last observed on a bare read, if any.
    pending_read: Option<u8>,
}

pub struct Machine {
    pub cpu: Cpu6502,
    pub mem: MemoryMap,
    pub keyboard: Keyboard,
    pub video: VideoFlags,
    pub speaker: Speaker,
    pub paddles: Paddles,
    /// Peripheral slots 1..7; index 0 is unused (slot 0 is the language
    /// card, handled directly by `Machine` rather than through this array).
    pub disks: [Option<DiskController>; NUM_SLOTS],
    lc_access: LcAccess,
    stop: bool,
}

impl Machine {
    pub fn new(main_rom: Vec<u8>, internal_rom: Vec<u8>, variant: CpuVariant) -> Machine {
        let has_aux = variant == CpuVariant::Cmos65C02;
        Machine {
            cpu: Cpu6502::new(variant),
            mem: MemoryMap::new(main_rom, internal_rom, has_aux),
            keyboard: Keyboard::default(),
            video: VideoFlags::default(),
            speaker: Speaker::new(),
            paddles: Paddles::default(),
            disks: Default::default(),
            lc_access: LcAccess::default(),
            stop: false,
        }
    }

    /// Installs a `DiskController` in slot `slot` (1..7), replacing whatever
    /// was there before.
    pub fn mount_disk_controller(&mut self, slot: u8, controller: DiskController) {
        assert!((1..=7).contains(&slot), "disk controllers live in slots 1..7");
        self.disks[slot as usize] = Some(controller);
    }

    pub fn opcode_policy(&self) -> OpcodePolicy {
        self.cpu.opcode_policy
    }

    pub fn set_opcode_policy(&mut self, policy: OpcodePolicy) {
        self.cpu.opcode_policy = policy;
    }

    pub fn request_stop(&mut self) {
        self.stop = true;
    }

    pub fn stop_requested(&self) -> bool {
        self.stop
    }

    pub fn reset(&mut self) {
        super::cpu::reset(self);
    }

    /// Executes one instruction and returns the number of cycles it took.
    pub fn step(&mut self) -> u32 {
        super::cpu::step(self)
    }

    fn floating_bus(&self) -> u8 {
        self.mem.read_floating_bus()
    }

    /// Dispatches one access to the $C000-$C0FF soft-switch table, per
    /// section 4.4. `value` is only meaningful when `is_write`.
    fn soft_switch(&mut self, addr: u16, value: u8, is_write: bool) -> u8 {
        let low = (addr & 0xFF) as u8;
        match low {
            0x00..=0x0B => self.memory_mode_toggle(low, is_write),
            0x0C..=0x0F => self.video_col_altchar_toggle(low, is_write),
            0x10 => self.keyboard.clear_strobe(),
            0x11..=0x18 => self.memory_mode_status(low),
            0x19..=0x1F => self.video_status(low),
            0x30 => {
                self.speaker.toggle(u64::from(self.cpu.state.tot_cycles));
                self.floating_bus()
            }
            0x50..=0x57 => self.video_mode_switch(low),
            0x61..=0x63 => {
                let pressed = self.paddles.buttons[(low - 0x61) as usize];
                (self.floating_bus() & 0x7F) | if pressed { 0x80 } else { 0x00 }
            }
            0x64..=0x67 => {
                let axis = (low - 0x64) as usize;
                let running = self.paddles.axis_running(axis, u64::from(self.cpu.state.tot_cycles));
                (self.floating_bus() & 0x7F) | if running { 0x80 } else { 0x00 }
            }
            0x70 => {
                self.paddles.strobe(u64::from(self.cpu.state.tot_cycles));
                self.floating_bus()
            }
            0x80..=0xFF => self.slot_io(low, value, is_write),
            _ => self.floating_bus(),
        }
    }

    fn memory_mode_toggle(&mut self, low: u8, is_write: bool) -> u8 {
        if is_write {
            use MemoryState::*;
            match low {
                0x00 => self.mem.state.remove(STORE_80),
                0x01 => self.mem.state.insert(STORE_80),
                0x02 => self.mem.state.remove(AUX_READ),
                0x03 => self.mem.state.insert(AUX_READ),
                0x04 => self.mem.state.remove(AUX_WRITE),
                0x05 => self.mem.state.insert(AUX_WRITE),
                0x06 => self.mem.state.insert(SLOTCX_ROM),
                0x07 => self.mem.state.remove(SLOTCX_ROM),
                0x08 => self.mem.state.remove(ALT_ZP),
                0x09 => self.mem.state.insert(ALT_ZP),
                0x0A => self.mem.state.remove(SLOTC3_ROM),
                0x0B => self.mem.state.insert(SLOTC3_ROM),
                _ => unreachable!(),
            }
            self.mem.set_paging_tables();
        }
        self.keyboard.read_latch()
    }

    fn video_col_altchar_toggle(&mut self, low: u8, is_write: bool) -> u8 {
        if is_write {
            match low {
                0x0C => self.video.remove(VideoFlags::COL80),
                0x0D => self.video.insert(VideoFlags::COL80),
                0x0E => self.video.remove(VideoFlags::ALTCHAR),
                0x0F => self.video.insert(VideoFlags::ALTCHAR),
                _ => unreachable!(),
            }
        }
        self.floating_bus()
    }

    /// $C011-$C018 status reads, matching the real Apple ][e layout: bit 7
    /// reflects the named flag, the rest of the byte is the floating bus.
    fn memory_mode_status(&self, low: u8) -> u8 {
        use MemoryState::*;
        let flag = match low {
            0x11 => LC_BANK2,
            0x12 => LC_READ,
            0x13 => AUX_READ,
            0x14 => AUX_WRITE,
            0x15 => SLOTCX_ROM,
            0x16 => ALT_ZP,
            0x17 => SLOTC3_ROM,
            0x18 => STORE_80,
            _ => unreachable!(),
        };
        self.status_bit(self.mem.state.contains(flag))
    }

    /// $C019-$C01F status reads. $19 (real hardware's VBL) has no backing
    /// video-scanner model in this implementation, so it reads as the
    /// floating bus like any unhandled soft switch.
    fn video_status(&self, low: u8) -> u8 {
        let flag = match low {
            0x19 => return self.floating_bus(),
            0x1A => VideoFlags::TEXT,
            0x1B => VideoFlags::MIXED,
            0x1C => VideoFlags::PAGE2,
            0x1D => VideoFlags::HIRES,
            0x1E => VideoFlags::ALTCHAR,
            0x1F => VideoFlags::COL80,
            _ => unreachable!(),
        };
        self.status_bit(self.video.contains(flag))
    }

    fn status_bit(&self, set: bool) -> u8 {
        (self.floating_bus() & 0x7F) | if set { 0x80 } else { 0x00 }
    }

    fn video_mode_switch(&mut self, low: u8) -> u8 {
        match low {
            0x50 => self.video.remove(VideoFlags::TEXT),
            0x51 => self.video.insert(VideoFlags::TEXT),
            0x52 => self.video.remove(VideoFlags::MIXED),
            0x53 => self.video.insert(VideoFlags::MIXED),
            0x54 => self.video.remove(VideoFlags::PAGE2),
            0x55 => self.video.insert(VideoFlags::PAGE2),
            0x56 => self.video.remove(VideoFlags::HIRES),
            0x57 => self.video.insert(VideoFlags::HIRES),
            _ => unreachable!(),
        }
        self.mem.video_page2 = self.video.contains(VideoFlags::PAGE2);
        self.mem.video_hires = self.video.contains(VideoFlags::HIRES);
        self.mem.set_paging_tables();
        self.floating_bus()
    }

    /// $C080-$C0FF: slot 0 is the language card, slots 1..7 are whatever
    /// peripheral (a Disk ][ controller, typically) is mounted there.
    fn slot_io(&mut self, low: u8, value: u8, is_write: bool) -> u8 {
        let slot = (low >> 4) - 8;
        let offset = low & 0x0F;
        if slot == 0 {
            self.language_card_switch(offset, is_write);
            self.floating_bus()
        } else if let Some(controller) = self.disks[slot as usize].as_mut() {
            controller.handle(offset, value, is_write)
        } else {
            self.floating_bus()
        }
    }

    /// Applies one access to the language-card soft switches per the table
    /// in section 4.4. Bank/read selection takes effect on every access;
    /// the write-protect latch follows the real hardware's "two consecutive
    /// reads of the same switch" rule for a write access requires only one
    /// (a `STA` is unambiguous; incidental reads are not, hence the double
    /// read requirement there).
    fn language_card_switch(&mut self, nibble: u8, is_write: bool) {
        let bank2 = nibble & 0x08 == 0;
        let ram_read = nibble & 0x02 != 0;
        let write_enable_eligible = nibble & 0x01 != 0;
        let switch_id = nibble & !0x04;

        self.mem.state.set(MemoryState::LC_BANK2, bank2);
        self.mem.state.set(MemoryState::LC_READ, ram_read);

        if !write_enable_eligible {
            self.mem.state.insert(MemoryState::LC_WRITE_PROTECT);
            self.lc_access.pending_read = None;
        } else if is_write {
            self.mem.state.remove(MemoryState::LC_WRITE_PROTECT);
            self.lc_access.pending_read = None;
        } else if self.lc_access.pending_read == Some(switch_id) {
            self.mem.state.remove(MemoryState::LC_WRITE_PROTECT);
        } else {
            self.lc_access.pending_read = Some(switch_id);
        }

        self.mem.set_paging_tables();
        trace!(
            "language card switch ${:02X}: bank2={} lc_read={} wp={}",
            0xC080 | nibble,
            bank2,
            ram_read,
            self.mem.state.contains(MemoryState::LC_WRITE_PROTECT)
        );
    }
}

impl WithCpu for Machine {
    fn cpu(&self) -> &Cpu6502 {
        &self.cpu
    }

    fn cpu_mut(&mut self) -> &mut Cpu6502 {
        &mut self.cpu
    }
}

impl Motherboard for Machine {
    fn read(&mut self, addr: u16) -> u8 {
        if (0xC000..=0xC0FF).contains(&addr) {
            self.soft_switch(addr, 0, false)
        } else {
            self.mem.read(addr)
        }
    }

    fn peek(&self, addr: u16) -> Option<u8> {
        if (0xC000..=0xC0FF).contains(&addr) {
            None
        } else {
            self.mem.peek(addr).to_optional()
        }
    }

    fn write(&mut self, addr: u16, data: u8) {
        if (0xC000..=0xC0FF).contains(&addr) {
            self.soft_switch(addr, data, true);
        } else {
            self.mem.write(addr, data);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_machine() -> Machine {
        Machine::new(vec![0xEA; super::super::memory::MAIN_ROM_SIZE], vec![0xEA; super::super::memory::INTERNAL_ROM_SIZE], CpuVariant::Nmos6502)
    }

    #[test]
    fn keyboard_wake_scenario() {
        let mut m = test_machine();
        m.write(0xC010, 0);
        m.keyboard.key_down(b'A');
        assert_eq!(m.read(0xC000), 0xC1);
        assert_eq!(m.read(0xC010), 0x41);
    }

    #[test]
    fn bank_switch_round_trip_scenario() {
        let mut m = test_machine();
        // $C08B selects LC bank 1, RAM read, write-enable on 2nd access.
        m.read(0xC08B);
        m.read(0xC08B);
        m.write(0xD000, 0x77);
        assert_eq!(m.read(0xD000), 0x77);

        // $C08A: same bank/read selection, but write-enable disabled (only
        // a single access, no write-enable bit), so RAM read is preserved
        // without perturbing the data just written.
        m.read(0xC08A);
        assert_eq!(m.read(0xD000), 0x77);

        // $C08E twice selects LC bank1, ROM read, write-enable disabled:
        // writes to $D000 are dropped, underlying RAM keeps its value but
        // reads now come from ROM.
        m.read(0xC08E);
        m.read(0xC08E);
        m.write(0xD000, 0x66);
        assert_eq!(m.read(0xD000), 0xEA);
    }

    #[test]
    fn video_page2_toggle_feeds_memory_map() {
        let mut m = test_machine();
        m.write(0xC001, 0); // STORE_80 on
        m.write(0xC055, 0); // PAGE2 on
        m.write(0x0400, 0x42);
        m.write(0xC054, 0); // PAGE2 off
        assert_ne!(m.read(0x0400), 0x42);
    }

    #[test]
    fn paddle_strobe_arms_axis_deadline() {
        let mut m = test_machine();
        m.paddles.axes[0] = 128;
        m.write(0xC070, 0);
        assert_eq!(m.read(0xC064) & 0x80, 0x80);
    }
}
