//! Disk ][ controller: stepper-motor phase/track tracking, the data
//! register, and the lazily-built per-track nibble buffer that sits between
//! the raw disk image and the byte-at-a-time interface the soft-switch
//! table exposes at $C0n0-$C0nF.

use std::path::Path;

use log::{trace, warn};

use super::diskimage::{nib_track_bytes, total_tracks, DiskImage};
use crate::error::ImageError;

pub struct DiskDrive {
    pub image: Option<DiskImage>,
    pub motor_on: bool,
    pub write_mode: bool,
    pub phase_status: u8,
    pub half_track_count: u8,
    pub current_track: u8,
    pub data_register: u8,
    track_buf: Option<Vec<u8>>,
    track_size: usize,
    current_byte: usize,
    dirty: bool,
    last_error: Option<ImageError>,
}

impl Default for DiskDrive {
    fn default() -> DiskDrive {
        DiskDrive {
            image: None,
            motor_on: false,
            write_mode: false,
            phase_status: 0,
            half_track_count: 0,
            current_track: 0,
            data_register: 0,
            track_buf: None,
            track_size: 0,
            current_byte: 0,
            dirty: false,
            last_error: None,
        }
    }
}

impl DiskDrive {
    pub fn insert(&mut self, path: &Path) -> Result<(), ImageError> {
        self.eject();
        self.image = Some(DiskImage::load(path)?);
        Ok(())
    }

    pub fn eject(&mut self) {
        self.flush_track();
        if let Some(image) = &mut self.image {
            if let Err(e) = image.save() {
                warn!("failed to save disk image on eject: {}", e);
            }
        }
        self.image = None;
        self.track_buf = None;
        self.track_size = 0;
        self.current_byte = 0;
    }

    pub fn last_error(&self) -> Option<&ImageError> {
        self.last_error.as_ref()
    }

    /// The drive's physical track count, independent of whether media is
    /// loaded: a real Disk ][ head travels the same 35-track range whether
    /// or not a disk is in the drive.
    pub fn num_tracks(&self) -> u8 {
        total_tracks() as u8
    }

    fn ensure_track_loaded(&mut self) {
        if self.track_buf.is_some() {
            return;
        }
        let mut buf = vec![0u8; nib_track_bytes()];
        if let Some(image) = &self.image {
            self.track_size = image.read_track(self.current_track as usize, &mut buf);
        }
        self.track_buf = Some(buf);
        self.dirty = false;
        self.current_byte = 0;
    }

    fn flush_track(&mut self) {
        if !self.dirty {
            return;
        }
        if let (Some(image), Some(buf)) = (&mut self.image, &self.track_buf) {
            if let Err(e) = image.write_track(self.current_track as usize, buf) {
                warn!("track {} failed to denibbilize: {}", self.current_track, e);
                self.last_error = Some(e);
            }
        }
        self.dirty = false;
    }

    fn set_track(&mut self, new_track: u8) {
        if new_track == self.current_track {
            return;
        }
        self.flush_track();
        self.current_track = new_track;
        self.track_buf = None;
        self.track_size = 0;
    }

    fn readwrite(&mut self) {
        self.ensure_track_loaded();
        let len = self.track_size.max(1);
        let buf = self.track_buf.as_mut().expect("track buffer just ensured");
        if self.write_mode {
            buf[self.current_byte] = self.data_register;
            self.dirty = true;
        } else {
            self.data_register = buf[self.current_byte];
        }
        self.current_byte = (self.current_byte + 1) % len;
    }

    fn step_phase(&mut self, addr_low: u8) {
        let phase = (addr_low >> 1) & 3;
        if addr_low & 1 != 0 {
            self.phase_status |= 1 << phase;
        } else {
            self.phase_status &= !(1 << phase);
        }

        let mut dir: i8 = 0;
        if self.phase_status & (1 << ((self.half_track_count.wrapping_add(1)) & 3)) != 0 {
            dir = 1;
        }
        if self.phase_status & (1 << ((self.half_track_count.wrapping_add(3)) & 3)) != 0 {
            dir = -1;
        }

        if dir != 0 {
            let new_half = (i16::from(self.half_track_count) + i16::from(dir)).clamp(0, 79) as u8;
            self.half_track_count = new_half;
            let max_track = self.num_tracks().saturating_sub(1);
            let new_track = (self.half_track_count >> 1).min(max_track);
            self.set_track(new_track);
        }
        trace!(
            "disk phase={:04b} half_track={} dir={}",
            self.phase_status & 0xF,
            self.half_track_count,
            dir
        );
    }
}

/// Up to two drives share one controller, matching one physical Disk ][
/// card; the workspace wires one controller into slot 6 by default, but the
/// controller itself doesn't know which slot it lives in.
pub struct DiskController {
    pub drives: [DiskDrive; 2],
    current: usize,
}

impl Default for DiskController {
    fn default() -> DiskController {
        DiskController {
            drives: [DiskDrive::default(), DiskDrive::default()],
            current: 0,
        }
    }
}

impl DiskController {
    pub fn current_drive(&self) -> &DiskDrive {
        &self.drives[self.current]
    }

    pub fn current_drive_mut(&mut self) -> &mut DiskDrive {
        &mut self.drives[self.current]
    }

    /// Dispatches one access to this controller's slot-relative $C0n0-$C0nF
    /// block. Every address in the block is live even on a bare read, per
    /// the hardware's side-effecting decode.
    pub fn handle(&mut self, addr_low: u8, value: u8, is_write: bool) -> u8 {
        let action = addr_low & 0x0F;
        // A bus write loads the data register before the action runs, so a
        // write to $C0nC (read/write data latch) in write-mode stores the
        // byte just written, not whatever was left over from the last access.
        if is_write {
            self.current_drive_mut().data_register = value;
        }
        match action {
            0x0..=0x7 => self.current_drive_mut().step_phase(addr_low),
            0x8 | 0x9 => self.current_drive_mut().motor_on = addr_low & 1 != 0,
            0xA | 0xB => self.current = (addr_low - 0xA) as usize,
            0xC => self.current_drive_mut().readwrite(),
            0xD => {
                let read_only = self.current_drive().image.as_ref().map(DiskImage::read_only).unwrap_or(false);
                let drive = self.current_drive_mut();
                if read_only {
                    drive.data_register |= 0x80;
                } else {
                    drive.data_register &= 0x7F;
                }
            }
            0xE => self.current_drive_mut().write_mode = false,
            0xF => self.current_drive_mut().write_mode = true,
            _ => unreachable!(),
        }

        if addr_low & 1 == 0 {
            self.current_drive().data_register
        } else {
            0
        }
    }
}
