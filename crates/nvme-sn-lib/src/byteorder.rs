//! Host byte-order capability and in-place swap primitives.
//!
//! NVMe data structures are little-endian on the wire.  The identify layer
//! is handed a [`ByteOrder`] describing the host instead of consulting a
//! compile-time global, so both orderings can be exercised on any machine.

use std::fmt;

use serde::Serialize;

/// Native byte order of the host the response buffer is interpreted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    /// Byte order of the running host.  Evaluate once at startup and pass the
    /// result down.
    pub fn host() -> Self {
        if u16::from_ne_bytes([0x01, 0x02]) == 0x0102 {
            ByteOrder::Big
        } else {
            ByteOrder::Little
        }
    }

    /// True when wire (little-endian) data must be swapped before the host
    /// can read it natively.
    pub fn needs_swap(self) -> bool {
        self == ByteOrder::Big
    }

    pub fn read_u16(self, b: [u8; 2]) -> u16 {
        match self {
            ByteOrder::Little => u16::from_le_bytes(b),
            ByteOrder::Big => u16::from_be_bytes(b),
        }
    }

    pub fn read_u32(self, b: [u8; 4]) -> u32 {
        match self {
            ByteOrder::Little => u32::from_le_bytes(b),
            ByteOrder::Big => u32::from_be_bytes(b),
        }
    }

    pub fn read_u64(self, b: [u8; 8]) -> u64 {
        match self {
            ByteOrder::Little => u64::from_le_bytes(b),
            ByteOrder::Big => u64::from_be_bytes(b),
        }
    }
}

impl fmt::Display for ByteOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ByteOrder::Little => write!(f, "little-endian"),
            ByteOrder::Big => write!(f, "big-endian"),
        }
    }
}

/// Exchange the two bytes.
pub fn swap2(b: &mut [u8; 2]) {
    b.swap(0, 1);
}

/// Exchange the outer pair, then swap the inner two bytes.
pub fn swap4(b: &mut [u8; 4]) {
    b.swap(0, 3);
    let [_, inner @ .., _] = b;
    swap2(inner);
}

/// Exchange the two outer pairs, then swap the middle four bytes.
pub fn swap8(b: &mut [u8; 8]) {
    b.swap(0, 7);
    b.swap(1, 6);
    let [_, _, inner @ .., _, _] = b;
    swap4(inner);
}
