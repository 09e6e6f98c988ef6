// id.rs — Global bus numbers and their per-rate allocator
//
// Buses are numbered independently in the audio and control spaces. The two
// lowest numbers of each space are reserved: every unconnected inlet reads
// bus 0 (never written, so always silent) and every unconnected outlet writes
// bus 1 (never read).

use serde::Serialize;
use std::fmt;

use crate::catalog::PortRate;

/// A bus number within one rate space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Bus(pub u32);

impl Bus {
    /// Read by inlets that no cable reaches.
    pub const UNCONNECTED_INPUT: Bus = Bus(0);
    /// Written by outlets that no cable leaves.
    pub const UNCONNECTED_OUTPUT: Bus = Bus(1);
    /// First number handed out by a `BusCounter`.
    pub const FIRST_FREE: Bus = Bus(2);

    pub fn is_reserved(self) -> bool {
        self < Self::FIRST_FREE
    }
}

impl fmt::Display for Bus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Produces monotonically increasing buses, one sequence per rate.
#[derive(Debug, Clone)]
pub struct BusCounter {
    next_audio: u32,
    next_control: u32,
}

impl Default for BusCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl BusCounter {
    pub fn new() -> Self {
        BusCounter {
            next_audio: Bus::FIRST_FREE.0,
            next_control: Bus::FIRST_FREE.0,
        }
    }

    pub fn alloc(&mut self, rate: PortRate) -> Bus {
        let next = match rate {
            PortRate::Audio => &mut self.next_audio,
            PortRate::Control => &mut self.next_control,
        };
        let bus = Bus(*next);
        *next += 1;
        bus
    }

    /// Highest bus number in use for `rate`, reserved ones included.
    pub fn highest(&self, rate: PortRate) -> Bus {
        let next = match rate {
            PortRate::Audio => self.next_audio,
            PortRate::Control => self.next_control,
        };
        Bus(next - 1)
    }
}
