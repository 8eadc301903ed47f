//! Disk ][ nibble encoding: converts between raw sector images (.dsk/.do/.po)
//! or a raw nibble stream (.nib) and the self-clocking byte stream the
//! controller in `disk.rs` reads a byte at a time off a simulated track.

use std::fs;
use std::path::{Path, PathBuf};

use log::warn;

use crate::error::ImageError;

pub const DSK_IMAGE_SIZE: usize = 143_360;
pub const NIB_IMAGE_SIZE: usize = 232_960;

const TOTAL_TRACKS: usize = 35;
const TOTAL_SECTORS: usize = 16;
const SECTOR_BYTES: usize = 256;
const NIB_TRACK_BYTES: usize = 6_656;

const GAP1_BYTES: usize = 48;
const GAP2_BYTES: usize = 6;
const GAP3_BYTES: usize = 27;

/// One logical sector -> physical sector permutation per format, used to
/// de-interleave sectors as they're written onto (or read off of) a track.
const DOS_SECTOR_MAP: [u8; 16] = [0, 7, 14, 6, 13, 5, 12, 4, 11, 3, 10, 2, 9, 1, 8, 15];
const PRODOS_SECTOR_MAP: [u8; 16] = [0, 8, 1, 9, 2, 10, 3, 11, 4, 12, 5, 13, 6, 14, 7, 15];

/// Maps a 6-bit value (shifted into bits 7:2) to a self-clocking disk byte:
/// high bit always set, no two adjacent zero bits.
const WRITE_TRANSLATE_TABLE: [u8; 64] = [
    0x96, 0x97, 0x9A, 0x9B, 0x9D, 0x9E, 0x9F, 0xA6, 0xA7, 0xAB, 0xAC, 0xAD, 0xAE, 0xAF, 0xB2, 0xB3,
    0xB4, 0xB5, 0xB6, 0xB7, 0xB9, 0xBA, 0xBB, 0xBC, 0xBD, 0xBE, 0xBF, 0xCB, 0xCD, 0xCE, 0xCF, 0xD3,
    0xD6, 0xD7, 0xD9, 0xDA, 0xDB, 0xDC, 0xDD, 0xDE, 0xDF, 0xE5, 0xE6, 0xE7, 0xE9, 0xEA, 0xEB, 0xEC,
    0xED, 0xEE, 0xEF, 0xF2, 0xF3, 0xF4, 0xF5, 0xF6, 0xF7, 0xF9, 0xFA, 0xFB, 0xFC, 0xFD, 0xFE, 0xFF,
];

/// Inverse of `WRITE_TRANSLATE_TABLE`, indexed by disk byte & 0x7F. Only 64 of
/// the 128 slots are populated; the rest are never produced by a valid
/// encode and read back as 0.
const READ_TRANSLATE_TABLE: [u8; 128] = [
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x04, 0x00, 0x00, 0x08, 0x0c, 0x00, 0x10, 0x14, 0x18,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x1c, 0x20, 0x00, 0x00, 0x00, 0x24, 0x28, 0x2c, 0x30, 0x34,
    0x00, 0x00, 0x38, 0x3c, 0x40, 0x44, 0x48, 0x4c, 0x00, 0x50, 0x54, 0x58, 0x5c, 0x60, 0x64, 0x68,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x6c, 0x00, 0x70, 0x74, 0x78,
    0x00, 0x00, 0x00, 0x7c, 0x00, 0x00, 0x80, 0x84, 0x00, 0x88, 0x8c, 0x90, 0x94, 0x98, 0x9c, 0xa0,
    0x00, 0x00, 0x00, 0x00, 0x00, 0xa4, 0xa8, 0xac, 0x00, 0xb0, 0xb4, 0xb8, 0xbc, 0xc0, 0xc4, 0xc8,
    0x00, 0x00, 0xcc, 0xd0, 0xd4, 0xd8, 0xdc, 0xe0, 0x00, 0xe4, 0xe8, 0xec, 0xf0, 0xf4, 0xf8, 0xfc,
];

#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum ImageFormat {
    Dos,
    ProDos,
    RawNibble,
}

pub struct DiskImage {
    path: PathBuf,
    raw: Vec<u8>,
    format: ImageFormat,
    read_only: bool,
    volume_num: u8,
    dirty: bool,
}

/// Splits byte `val` into two disk bytes under 4-and-4 encoding: the high
/// nibble interleaved into one byte, the low nibble into another, each
/// OR-ed with $AA to guarantee the high bit and self-clocking property.
fn code44(out: &mut Vec<u8>, val: u8) {
    out.push(((val >> 1) & 0x55) | 0xAA);
    out.push((val & 0x55) | 0xAA);
}

fn low2_swapped(b: u8) -> u8 {
    ((b & 0x01) << 1) | ((b & 0x02) >> 1)
}

impl DiskImage {
    pub fn load(path: &Path) -> Result<DiskImage, ImageError> {
        let raw = fs::read(path).map_err(|e| ImageError::Unreadable(path.to_path_buf(), e))?;
        let read_only = fs::metadata(path).map(|m| m.permissions().readonly()).unwrap_or(false);
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("").to_ascii_lowercase();

        let format = match (ext.as_str(), raw.len()) {
            ("dsk", DSK_IMAGE_SIZE) | ("do", DSK_IMAGE_SIZE) => ImageFormat::Dos,
            ("po", DSK_IMAGE_SIZE) => ImageFormat::ProDos,
            ("nib", NIB_IMAGE_SIZE) => ImageFormat::RawNibble,
            _ => return Err(ImageError::UnrecognizedSize(path.to_path_buf(), raw.len())),
        };

        Ok(DiskImage {
            path: path.to_path_buf(),
            raw,
            format,
            read_only,
            volume_num: 254,
            dirty: false,
        })
    }

    pub fn read_only(&self) -> bool {
        self.read_only
    }

    pub fn save(&mut self) -> Result<(), ImageError> {
        if !self.dirty {
            return Ok(());
        }
        fs::write(&self.path, &self.raw).map_err(|e| ImageError::Unwritable(self.path.clone(), e))?;
        self.dirty = false;
        Ok(())
    }

    /// Writes the nibbilized representation of `track` into `out`, returning
    /// the number of bytes written.
    pub fn read_track(&self, track: usize, out: &mut [u8]) -> usize {
        match self.format {
            ImageFormat::RawNibble => {
                let start = track * NIB_TRACK_BYTES;
                let n = NIB_TRACK_BYTES.min(out.len());
                out[..n].copy_from_slice(&self.raw[start..start + n]);
                n
            }
            ImageFormat::Dos | ImageFormat::ProDos => self.nibbilize_track(track, out),
        }
    }

    /// Denibbilizes `buf` (a full nibble track) back into the raw image and
    /// marks it dirty. Returns `ImageError::TrackCorrupted` without touching
    /// the raw image if a prologue doesn't match.
    pub fn write_track(&mut self, track: usize, buf: &[u8]) -> Result<(), ImageError> {
        match self.format {
            ImageFormat::RawNibble => {
                let start = track * NIB_TRACK_BYTES;
                let n = NIB_TRACK_BYTES.min(buf.len());
                self.raw[start..start + n].copy_from_slice(&buf[..n]);
                self.dirty = true;
                Ok(())
            }
            ImageFormat::Dos | ImageFormat::ProDos => {
                self.denibbilize_track(track, buf)?;
                self.dirty = true;
                Ok(())
            }
        }
    }

    fn sector_map(&self) -> &'static [u8; 16] {
        match self.format {
            ImageFormat::Dos => &DOS_SECTOR_MAP,
            ImageFormat::ProDos => &PRODOS_SECTOR_MAP,
            ImageFormat::RawNibble => unreachable!("raw-nibble images don't de-interleave"),
        }
    }

    fn nibbilize_track(&self, track: usize, out: &mut [u8]) -> usize {
        let track_start = track * TOTAL_SECTORS * SECTOR_BYTES;
        let mut pos = 0usize;
        let mut push = |byte: u8, out: &mut [u8], pos: &mut usize| {
            out[*pos] = byte;
            *pos += 1;
        };

        for _ in 0..GAP1_BYTES {
            push(0xFF, out, &mut pos);
        }

        for sector in 0..TOTAL_SECTORS {
            let mapped_sector = self.sector_map()[sector] as usize;
            let sector_start = track_start + mapped_sector * SECTOR_BYTES;
            let sector_data = &self.raw[sector_start..sector_start + SECTOR_BYTES];

            let mut field = Vec::with_capacity(14);
            field.push(0xD5);
            field.push(0xAA);
            field.push(0x96);
            code44(&mut field, self.volume_num);
            code44(&mut field, track as u8);
            code44(&mut field, sector as u8);
            code44(&mut field, self.volume_num ^ (track as u8) ^ (sector as u8));
            field.push(0xDE);
            field.push(0xAA);
            field.push(0xEB);
            for b in field {
                push(b, out, &mut pos);
            }

            for _ in 0..GAP2_BYTES {
                push(0xFF, out, &mut pos);
            }

            push(0xD5, out, &mut pos);
            push(0xAA, out, &mut pos);
            push(0xAD, out, &mut pos);

            let mut nib_data = [0u8; 343];
            for offset in 0usize..0x56 {
                let hi_idx = offset.wrapping_add(0xAC) & 0xFF;
                let mid_idx = offset + 0x56;
                let val = (low2_swapped(sector_data[hi_idx]) << 6)
                    | (low2_swapped(sector_data[mid_idx]) << 4)
                    | (low2_swapped(sector_data[offset]) << 2);
                nib_data[offset] = val;
            }
            nib_data[0x54] &= 0x3F;
            nib_data[0x55] &= 0x3F;
            for (i, b) in sector_data.iter().enumerate() {
                nib_data[0x56 + i] = *b;
            }
            nib_data[342] = 0;

            let mut xor_value = 0u8;
            for b in nib_data.iter_mut() {
                let prev = *b;
                *b ^= xor_value;
                xor_value = prev;
            }

            for b in nib_data.iter() {
                push(WRITE_TRANSLATE_TABLE[(*b >> 2) as usize], out, &mut pos);
            }

            push(0xDE, out, &mut pos);
            push(0xAA, out, &mut pos);
            push(0xEB, out, &mut pos);

            for _ in 0..GAP3_BYTES {
                push(0xFF, out, &mut pos);
            }
        }

        pos
    }

    fn denibbilize_track(&mut self, track: usize, buf: &[u8]) -> Result<(), ImageError> {
        let track_start = track * TOTAL_SECTORS * SECTOR_BYTES;
        let mut cursor = 0usize;
        let sector_map = *self.sector_map();

        let skip_sync = |buf: &[u8], cursor: &mut usize| {
            while *cursor < buf.len() && buf[*cursor] == 0xFF {
                *cursor += 1;
            }
        };

        for _ in 0..TOTAL_SECTORS {
            skip_sync(buf, &mut cursor);
            if cursor + 3 > buf.len() || &buf[cursor..cursor + 3] != [0xD5, 0xAA, 0x96] {
                return Err(ImageError::TrackCorrupted(track, "bad address prologue"));
            }
            cursor += 3;
            cursor += 2; // volume (4-and-4 encoded, 2 bytes)

            let encoded_track = (buf[cursor] & 0x55) << 1 | (buf[cursor + 1] & 0x55);
            cursor += 2;
            if encoded_track as usize != track {
                return Err(ImageError::TrackCorrupted(track, "address field track mismatch"));
            }

            let encoded_sector = (buf[cursor] & 0x55) << 1 | (buf[cursor + 1] & 0x55);
            cursor += 2;
            cursor += 2; // checksum
            cursor += 3; // epilogue

            skip_sync(buf, &mut cursor);
            if cursor + 3 > buf.len() || &buf[cursor..cursor + 3] != [0xD5, 0xAA, 0xAD] {
                return Err(ImageError::TrackCorrupted(track, "bad data prologue"));
            }
            cursor += 3;

            let mut nib_data = [0u8; 343];
            for slot in nib_data.iter_mut() {
                *slot = READ_TRANSLATE_TABLE[(buf[cursor] & 0x7F) as usize];
                cursor += 1;
            }
            cursor += 3; // data epilogue

            let mut xor_value = 0u8;
            for b in nib_data.iter_mut() {
                *b ^= xor_value;
                xor_value = *b;
            }

            let mapped_sector = sector_map[encoded_sector as usize] as usize;
            let sector_start = track_start + mapped_sector * SECTOR_BYTES;
            let sector_data = &mut self.raw[sector_start..sector_start + SECTOR_BYTES];
            for byte_num in 0usize..0x56 {
                sector_data[byte_num] = (nib_data[byte_num + 0x56] & 0xFC)
                    | ((nib_data[byte_num] & 0x08) >> 3)
                    | ((nib_data[byte_num] & 0x04) >> 1);
                sector_data[byte_num + 0x56] = (nib_data[byte_num + 0x56 + 0x56] & 0xFC)
                    | ((nib_data[byte_num] & 0x20) >> 5)
                    | ((nib_data[byte_num] & 0x10) >> 3);
                let hi_idx = byte_num + 0xAC;
                if hi_idx < 0x100 {
                    sector_data[hi_idx] = (nib_data[hi_idx + 0x56] & 0xFC)
                        | ((nib_data[byte_num] & 0x80) >> 7)
                        | ((nib_data[byte_num] & 0x40) >> 5);
                }
            }
        }

        Ok(())
    }
}

pub fn nib_track_bytes() -> usize {
    NIB_TRACK_BYTES
}

pub fn total_tracks() -> usize {
    TOTAL_TRACKS
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zeroed_dos_image() -> DiskImage {
        DiskImage {
            path: PathBuf::from("test.dsk"),
            raw: vec![0u8; DSK_IMAGE_SIZE],
            format: ImageFormat::Dos,
            read_only: false,
            volume_num: 254,
            dirty: false,
        }
    }

    #[test]
    fn nibbilizing_a_zeroed_sector_emits_all_sync_byte_96() {
        let image = zeroed_dos_image();
        let mut buf = vec![0u8; NIB_TRACK_BYTES];
        let written = image.nibbilize_track(0, &mut buf);
        assert!(written > 0);
        // The data field's 343 encoded bytes for an all-zero sector must all
        // be the first write-translate entry, $96, since the checksum chain
        // over all-zero input produces all-zero 6-bit values.
        let data_prologue = buf.windows(3).position(|w| w == [0xD5, 0xAA, 0xAD]).unwrap();
        let data_start = data_prologue + 3;
        for &b in &buf[data_start..data_start + 343] {
            assert_eq!(b, 0x96);
        }
    }

    #[test]
    fn nibbilize_then_denibbilize_round_trips() {
        let mut image = zeroed_dos_image();
        for (i, b) in image.raw.iter_mut().enumerate().take(SECTOR_BYTES) {
            *b = (i % 256) as u8;
        }
        let original = image.raw.clone();
        let mut buf = vec![0u8; NIB_TRACK_BYTES];
        image.nibbilize_track(0, &mut buf);
        image.denibbilize_track(0, &buf).unwrap();
        assert_eq!(image.raw[..TOTAL_SECTORS * SECTOR_BYTES], original[..TOTAL_SECTORS * SECTOR_BYTES]);
    }

    #[test]
    fn rejects_unrecognized_image_size() {
        let path = std::env::temp_dir().join("apple2-core-test-unrecognized.bin");
        fs::write(&path, vec![0u8; 1234]).unwrap();
        let result = DiskImage::load(&path);
        assert!(matches!(result, Err(ImageError::UnrecognizedSize(_, 1234))));
        let _ = fs::remove_file(&path);
    }
}
