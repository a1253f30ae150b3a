//! nvme-sn: read NVMe controller identity (model, firmware, serial) through
//! the Linux admin pass-through ioctl.

pub mod byteorder;
pub mod command;
pub mod config;
pub mod device;
pub mod error;
pub mod field;
pub mod identify;
pub mod protocol;
pub mod query;

pub use error::NvmeSnError;
