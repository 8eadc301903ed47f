use std::path::PathBuf;

use thiserror::Error;

/// Failures that can occur while assembling a runnable `Machine`: loading a
/// ROM, parsing a settings file, or otherwise setting up before the first
/// `step()`. These are always fatal to the process that triggered them.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("ROM image {0:?} could not be read: {1}")]
    UnreadableRom(PathBuf, std::io::Error),

    #[error("ROM image {0:?} is {1} bytes, expected 12288 (][/][+) or 16384 (][e)")]
    UnexpectedRomSize(PathBuf, usize),

    #[error("binary image {0:?} could not be read: {1}")]
    UnreadableBinary(PathBuf, std::io::Error),

    #[error("settings file {0:?} could not be read: {1}")]
    UnreadableSettings(PathBuf, std::io::Error),

    #[error("unrecognized --cpu variant {0:?}, expected \"6502\" or \"65c02\"")]
    UnknownCpuVariant(String),

    #[error("--pc value {0:?} is not a valid 16-bit hex address")]
    InvalidPc(String),
}

/// Failures local to a single disk image or a single track. These never
/// propagate to the CPU; they are logged and recorded as the owning drive's
/// last error.
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("disk image {0:?} could not be read: {1}")]
    Unreadable(PathBuf, std::io::Error),

    #[error("disk image {0:?} could not be written: {1}")]
    Unwritable(PathBuf, std::io::Error),

    #[error("disk image {0:?} is {1} bytes, which matches no known .dsk/.do/.po/.nib format")]
    UnrecognizedSize(PathBuf, usize),

    #[error("track {0} is corrupted: {1}")]
    TrackCorrupted(usize, &'static str),
}
