//! The small pieces of machine state reachable only through the soft-switch
//! table: keyboard latch, video mode flags, the speaker line, and the four
//! paddle axes. None of these have a component budget of their own in the
//! distilled machine description, but the soft-switch dispatch in
//! `machine.rs` is a stub without them.

use crossbeam_channel::{bounded, Receiver, Sender};

/// Last key code (high bit set, per Apple ][ convention) and the strobe bit
/// that `key_down` sets and a $C010 access clears.
#[derive(Debug, Default)]
pub struct Keyboard {
    latch: u8,
    strobe: bool,
}

impl Keyboard {
    pub fn key_down(&mut self, ascii: u8) {
        self.latch = ascii | 0x80;
        self.strobe = true;
    }

    /// Value read at $C000 and its mirrors: bit 7 is the strobe bit.
    pub fn read_latch(&self) -> u8 {
        if self.strobe {
            self.latch | 0x80
        } else {
            self.latch & 0x7F
        }
    }

    /// Any access to $C010 clears the strobe (not the latched key itself)
    /// and returns the key byte with the strobe bit already cleared.
    pub fn clear_strobe(&mut self) -> u8 {
        self.strobe = false;
        self.read_latch()
    }
}

bitflags! {
    #[derive(Default)]
    pub struct VideoFlags: u8 {
        const TEXT    = 0x01;
        const MIXED   = 0x02;
        const PAGE2   = 0x04;
        const HIRES   = 0x08;
        const COL80   = 0x10;
        const ALTCHAR = 0x20;
    }
}

/// A signed edge pushed onto the audio ring buffer every time the speaker
/// line flips, timestamped in absolute CPU cycles so the host can
/// reconstruct a waveform at whatever sample rate it wants.
#[derive(Debug, Copy, Clone)]
pub struct SpeakerEdge {
    pub cycle: u64,
    pub rising: bool,
}

/// A toggled line sampled into a bounded single-producer/single-consumer
/// ring buffer for host audio playback; a full channel drops the oldest
/// pending edge rather than blocking the CPU loop.
pub struct Speaker {
    line: bool,
    tx: Sender<SpeakerEdge>,
    rx: Receiver<SpeakerEdge>,
}

const SPEAKER_RING_CAPACITY: usize = 4096;

impl Speaker {
    pub fn new() -> Speaker {
        let (tx, rx) = bounded(SPEAKER_RING_CAPACITY);
        Speaker { line: false, tx, rx }
    }

    pub fn toggle(&mut self, cycle: u64) {
        self.line = !self.line;
        let edge = SpeakerEdge { cycle, rising: self.line };
        if self.tx.try_send(edge).is_err() {
            // Ring is full; drop the oldest edge to make room rather than
            // stalling the CPU loop on a slow or absent consumer.
            let _ = self.rx.try_recv();
            let _ = self.tx.try_send(edge);
        }
    }

    pub fn receiver(&self) -> Receiver<SpeakerEdge> {
        self.rx.clone()
    }
}

impl Default for Speaker {
    fn default() -> Speaker {
        Speaker::new()
    }
}

/// Four analog axes plus four buttons, sampled via the $C070 strobe-and-
/// deadline scheme: each axis arms a deadline in absolute CPU cycles, and
/// reads of $C064-$C067 report "timer still running" until that deadline
/// passes.
#[derive(Debug, Default)]
pub struct Paddles {
    pub axes: [u8; 4],
    pub buttons: [bool; 4],
    deadlines: [u64; 4],
}

/// Apple ][ paddle RC timer constant: axis_value * (2816/255) cycles gives a
/// ~3ms full-scale sweep at 1MHz; computed per-axis (not pre-divided) so the
/// rounding matches the documented formula at every axis value.
const PADDLE_DEADLINE_NUMERATOR: u64 = 2816;
const PADDLE_DEADLINE_DENOMINATOR: u64 = 255;

impl Paddles {
    pub fn strobe(&mut self, current_cycle: u64) {
        for (axis, deadline) in self.axes.iter().zip(self.deadlines.iter_mut()) {
            *deadline = current_cycle + (u64::from(*axis) * PADDLE_DEADLINE_NUMERATOR) / PADDLE_DEADLINE_DENOMINATOR;
        }
    }

    pub fn axis_running(&self, axis: usize, current_cycle: u64) -> bool {
        current_cycle < self.deadlines[axis]
    }
}
