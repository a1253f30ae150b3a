//! NVMe admin protocol constants and the Linux pass-through descriptor.
//!
//! Values from the NVM Express Base Specification and
//! `include/uapi/linux/nvme_ioctl.h`.

use std::fmt;

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

// ── Admin opcodes ──

/// Admin command opcodes used by this crate.
///
/// The two low bits of an opcode encode its data direction
/// (see [`DataDirection::from_opcode`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AdminOpcode {
    Identify = 0x06,
}

impl AdminOpcode {
    pub fn raw(self) -> u8 {
        self as u8
    }

    pub fn direction(self) -> DataDirection {
        DataDirection::from_opcode(self.raw())
    }
}

impl fmt::Display for AdminOpcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdminOpcode::Identify => write!(f, "Identify"),
        }
    }
}

/// Data transfer direction as encoded in opcode bits 1:0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataDirection {
    NoData = 0x0,
    /// Host to controller.
    Out = 0x1,
    /// Controller to host.
    In = 0x2,
    Bidirectional = 0x3,
}

impl DataDirection {
    pub fn from_opcode(opcode: u8) -> Self {
        match opcode & 0x3 {
            0x0 => DataDirection::NoData,
            0x1 => DataDirection::Out,
            0x2 => DataDirection::In,
            _ => DataDirection::Bidirectional,
        }
    }
}

impl fmt::Display for DataDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataDirection::NoData => write!(f, "no-data"),
            DataDirection::Out => write!(f, "data-out"),
            DataDirection::In => write!(f, "data-in"),
            DataDirection::Bidirectional => write!(f, "bidirectional"),
        }
    }
}

// ── Identify ──

/// CNS value (CDW10 bits 7:0) selecting the namespace data structure.
pub const IDENTIFY_CNS_NAMESPACE: u32 = 0x00;

/// CNS value selecting the controller data structure.
pub const IDENTIFY_CNS_CONTROLLER: u32 = 0x01;

/// Size of every identify data structure.
pub const IDENTIFY_DATA_SIZE: usize = 4096;

/// Number of power state descriptors in the controller structure.
pub const POWER_STATE_COUNT: usize = 32;

/// Namespace id addressing the controller as a whole.
pub const NSID_CONTROLLER: u32 = 0;

/// Namespace id addressing every namespace.
pub const NSID_BROADCAST: u32 = 0xFFFF_FFFF;

// ── Linux ioctl interface ──

/// ioctl type byte for the NVMe driver (`'N'`).
pub const NVME_IOCTL_TYPE: u8 = b'N';

/// `NVME_IOCTL_ID = _IO('N', 0x40)`: returns the namespace id of the node.
pub const NVME_IOCTL_ID_NR: u8 = 0x40;

/// `NVME_IOCTL_ADMIN_CMD = _IOWR('N', 0x41, struct nvme_admin_cmd)`.
pub const NVME_IOCTL_ADMIN_CMD_NR: u8 = 0x41;

/// Full request code of the admin pass-through ioctl, as the kernel header
/// spells it.  The channel derives its request from the `_NR` value and the
/// descriptor size; tests check the result against this constant.
pub const NVME_IOCTL_ADMIN_CMD: u32 = 0xC048_4E41;

/// `struct nvme_passthru_cmd` (a.k.a. `nvme_admin_cmd`), 72 bytes.
#[repr(C)]
#[derive(Debug, Default, Clone, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct PassthruCmd {
    pub opcode: u8,
    pub flags: u8,
    pub rsvd1: u16,
    pub nsid: u32,
    pub cdw2: u32,
    pub cdw3: u32,
    pub metadata: u64,
    pub addr: u64,
    pub metadata_len: u32,
    pub data_len: u32,
    pub cdw10: u32,
    pub cdw11: u32,
    pub cdw12: u32,
    pub cdw13: u32,
    pub cdw14: u32,
    pub cdw15: u32,
    /// 0 = kernel default (60 s for admin commands).
    pub timeout_ms: u32,
    /// Command specific result (completion DW0), written by the kernel.
    pub result: u32,
}

const _: () = assert!(std::mem::size_of::<PassthruCmd>() == 72);
