//! Admin command value object.

use crate::device::{DeviceError, Result};
use crate::protocol::{AdminOpcode, DataDirection, PassthruCmd};

/// Buffer carried by an admin command, tagged with its transfer direction.
#[derive(Debug)]
pub enum DataTransfer<'a> {
    None,
    /// Host to controller.
    Out(&'a [u8]),
    /// Controller to host.
    In(&'a mut [u8]),
    /// Same buffer is sent and then overwritten by the controller.
    Bidirectional(&'a mut [u8]),
}

impl DataTransfer<'_> {
    pub fn direction(&self) -> DataDirection {
        match self {
            DataTransfer::None => DataDirection::NoData,
            DataTransfer::Out(_) => DataDirection::Out,
            DataTransfer::In(_) => DataDirection::In,
            DataTransfer::Bidirectional(_) => DataDirection::Bidirectional,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            DataTransfer::None => 0,
            DataTransfer::Out(b) => b.len(),
            DataTransfer::In(b) | DataTransfer::Bidirectional(b) => b.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Address handed to the kernel; 0 when there is no buffer.
    fn addr(&mut self) -> u64 {
        match self {
            DataTransfer::None => 0,
            DataTransfer::Out(b) => b.as_ptr() as u64,
            DataTransfer::In(b) | DataTransfer::Bidirectional(b) => b.as_mut_ptr() as u64,
        }
    }
}

/// One administrative command ready for submission.
///
/// Built through [`AdminCommand::new`], which rejects a transfer whose
/// direction disagrees with the opcode and any data transfer with an empty
/// buffer.
#[derive(Debug)]
pub struct AdminCommand<'a> {
    opcode: AdminOpcode,
    pub nsid: u32,
    pub cdw10: u32,
    pub cdw11: u32,
    pub cdw12: u32,
    pub cdw13: u32,
    pub cdw14: u32,
    pub cdw15: u32,
    /// 0 = kernel default.
    pub timeout_ms: u32,
    data: DataTransfer<'a>,
}

impl<'a> AdminCommand<'a> {
    pub fn new(opcode: AdminOpcode, nsid: u32, data: DataTransfer<'a>) -> Result<Self> {
        let expected = opcode.direction();
        if data.direction() != expected {
            return Err(DeviceError::InvalidCommand(format!(
                "{opcode} (0x{:02X}) is {expected}, got a {} buffer",
                opcode.raw(),
                data.direction()
            )));
        }
        if expected != DataDirection::NoData && data.is_empty() {
            return Err(DeviceError::InvalidCommand(format!(
                "{opcode} requires a non-empty {expected} buffer"
            )));
        }
        if u32::try_from(data.len()).is_err() {
            return Err(DeviceError::InvalidCommand(format!(
                "{opcode} buffer too large: {} bytes",
                data.len()
            )));
        }
        Ok(AdminCommand {
            opcode,
            nsid,
            cdw10: 0,
            cdw11: 0,
            cdw12: 0,
            cdw13: 0,
            cdw14: 0,
            cdw15: 0,
            timeout_ms: 0,
            data,
        })
    }

    /// Convenience for the common controller-to-host case.
    pub fn data_in(opcode: AdminOpcode, nsid: u32, buf: &'a mut [u8]) -> Result<Self> {
        Self::new(opcode, nsid, DataTransfer::In(buf))
    }

    pub fn with_cdw10(mut self, cdw10: u32) -> Self {
        self.cdw10 = cdw10;
        self
    }

    pub fn opcode(&self) -> AdminOpcode {
        self.opcode
    }

    pub fn direction(&self) -> DataDirection {
        self.data.direction()
    }

    pub fn data(&self) -> &DataTransfer<'a> {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut DataTransfer<'a> {
        &mut self.data
    }

    /// Build the kernel descriptor.  The returned value points into this
    /// command's buffer, so it must not outlive `self`'s borrow.
    pub fn to_passthru(&mut self) -> PassthruCmd {
        let data_len = self.data.len() as u32;
        PassthruCmd {
            opcode: self.opcode.raw(),
            nsid: self.nsid,
            addr: self.data.addr(),
            data_len,
            cdw10: self.cdw10,
            cdw11: self.cdw11,
            cdw12: self.cdw12,
            cdw13: self.cdw13,
            cdw14: self.cdw14,
            cdw15: self.cdw15,
            timeout_ms: self.timeout_ms,
            ..Default::default()
        }
    }
}

/// Completion of a successful command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommandCompletion {
    /// Command specific result (completion queue entry DW0).
    pub result: u32,
}
