//! Device channel: trait, Linux backend and test mock.

use std::fmt;

use serde::Serialize;

use crate::command::{AdminCommand, CommandCompletion};

// ── Error type ──

/// Device channel errors.
///
/// String payloads follow the convention **"context: details"** where
/// *context* names the failing call (e.g. `"NVME_IOCTL_ADMIN_CMD"`).
#[derive(Debug)]
pub enum DeviceError {
    /// The device node could not be opened (missing, permission, not a device).
    OpenFailed {
        path: String,
        source: std::io::Error,
    },
    /// `submit` was called on a closed channel.
    NotOpen,
    /// The pass-through ioctl itself failed.
    SubmitFailed(String),
    /// The controller completed the command with a non-zero status field.
    CommandStatus(u32),
    /// The command was rejected before submission.
    InvalidCommand(String),
    /// No pass-through backend on this platform.
    Unsupported,
}

impl DeviceError {
    /// Status Code (SC) of a [`DeviceError::CommandStatus`].
    pub fn status_code(&self) -> Option<u8> {
        match self {
            DeviceError::CommandStatus(s) => Some((s & 0xFF) as u8),
            _ => None,
        }
    }

    /// Status Code Type (SCT) of a [`DeviceError::CommandStatus`].
    pub fn status_code_type(&self) -> Option<u8> {
        match self {
            DeviceError::CommandStatus(s) => Some(((s >> 8) & 0x7) as u8),
            _ => None,
        }
    }
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::OpenFailed { path, source } => {
                write!(f, "Failed to open {path}: {source}")
            }
            DeviceError::NotOpen => write!(f, "Device channel is not open"),
            DeviceError::SubmitFailed(e) => write!(f, "Admin command failed: {e}"),
            DeviceError::CommandStatus(s) => write!(
                f,
                "Controller returned status 0x{s:04X} (SCT {}, SC 0x{:02X})",
                (s >> 8) & 0x7,
                s & 0xFF
            ),
            DeviceError::InvalidCommand(e) => write!(f, "Invalid admin command: {e}"),
            DeviceError::Unsupported => {
                write!(f, "NVMe pass-through is not supported on this platform")
            }
        }
    }
}

impl std::error::Error for DeviceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DeviceError::OpenFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, DeviceError>;

// ── Device info ──

#[derive(Debug, Clone, Serialize)]
pub struct DeviceInfo {
    /// Device node path, e.g. `/dev/nvme0`.
    pub path: String,
    /// Informal name shown to the user.
    pub info_name: String,
    /// Actual device type.
    pub dev_type: String,
    /// Device type requested by the user, empty if none.
    pub req_type: String,
}

impl DeviceInfo {
    pub fn new(path: &str) -> Self {
        DeviceInfo {
            path: path.to_string(),
            info_name: path.to_string(),
            dev_type: "nvme".into(),
            req_type: String::new(),
        }
    }
}

/// Access mode used to open the device node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OpenMode {
    /// `O_RDONLY | O_NONBLOCK`, no retry.
    #[default]
    ReadOnly,
    /// `O_RDWR | O_NONBLOCK`, retried once read-only on `EROFS`.
    ReadWrite,
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpenMode::ReadOnly => write!(f, "read-only"),
            OpenMode::ReadWrite => write!(f, "read-write"),
        }
    }
}

/// Per-channel settings fixed at construction.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChannelOptions {
    /// Namespace id to address; 0 resolves it from the device node on open.
    pub namespace_id: u32,
    pub open_mode: OpenMode,
}

// ── Trait ──

/// One open handle to an NVMe device node.
///
/// State machine: `Closed → Open` via [`open`](NvmeChannel::open),
/// `Open → Closed` via [`close`](NvmeChannel::close).  A failed open leaves
/// the channel closed; calling `open` again is the only retry.
pub trait NvmeChannel {
    fn info(&self) -> &DeviceInfo;
    fn is_open(&self) -> bool;
    fn open(&mut self) -> Result<()>;
    /// Release the handle.  Closing a closed channel does nothing.
    fn close(&mut self);
    /// Namespace id in effect (resolved on open when configured as 0).
    fn namespace_id(&self) -> u32;
    /// Submit one admin command.  Only a zero completion status is success.
    fn submit(&self, cmd: &mut AdminCommand<'_>) -> Result<CommandCompletion>;
}

// ── Linux implementation ──

#[cfg(target_os = "linux")]
mod linux_impl {
    use super::*;
    use std::os::fd::{AsRawFd, FromRawFd, IntoRawFd, OwnedFd, RawFd};

    use nix::errno::Errno;
    use nix::fcntl::{FcntlArg, FdFlag, OFlag, fcntl, open};
    use nix::sys::stat::Mode;

    use crate::protocol::{
        NVME_IOCTL_ADMIN_CMD_NR, NVME_IOCTL_ID_NR, NVME_IOCTL_TYPE, PassthruCmd,
    };

    nix::ioctl_none!(nvme_ioctl_id, NVME_IOCTL_TYPE, NVME_IOCTL_ID_NR);
    nix::ioctl_readwrite!(
        nvme_ioctl_admin_cmd,
        NVME_IOCTL_TYPE,
        NVME_IOCTL_ADMIN_CMD_NR,
        PassthruCmd
    );

    enum ChannelState {
        Closed,
        Open { fd: OwnedFd, flags: OFlag },
    }

    pub struct LinuxDevice {
        info: DeviceInfo,
        flags: OFlag,
        /// Flags for a second attempt after `EROFS`, if any.
        retry_flags: Option<OFlag>,
        requested_nsid: u32,
        nsid: u32,
        state: ChannelState,
    }

    impl LinuxDevice {
        pub fn new(path: &str, options: ChannelOptions) -> Self {
            let (flags, retry_flags) = match options.open_mode {
                OpenMode::ReadOnly => (OFlag::O_RDONLY | OFlag::O_NONBLOCK, None),
                OpenMode::ReadWrite => (
                    OFlag::O_RDWR | OFlag::O_NONBLOCK,
                    Some(OFlag::O_RDONLY | OFlag::O_NONBLOCK),
                ),
            };
            LinuxDevice {
                info: DeviceInfo::new(path),
                flags,
                retry_flags,
                requested_nsid: options.namespace_id,
                nsid: options.namespace_id,
                state: ChannelState::Closed,
            }
        }

        /// Flags the handle was actually opened with (None while closed).
        pub fn active_flags(&self) -> Option<OFlag> {
            match &self.state {
                ChannelState::Open { flags, .. } => Some(*flags),
                ChannelState::Closed => None,
            }
        }

        fn raw_fd(&self) -> Option<RawFd> {
            match &self.state {
                ChannelState::Open { fd, .. } => Some(fd.as_raw_fd()),
                ChannelState::Closed => None,
            }
        }

        /// Open with the primary flags; on `EROFS` try the retry flags once.
        fn open_fd(
            &self,
            mut open_fn: impl FnMut(&str, OFlag) -> nix::Result<RawFd>,
        ) -> nix::Result<(RawFd, OFlag)> {
            let path = self.info.path.as_str();
            match (open_fn(path, self.flags), self.retry_flags) {
                (Err(Errno::EROFS), Some(retry)) => {
                    log::debug!("{path}: read-only filesystem, retrying with {retry:?}");
                    open_fn(path, retry).map(|fd| (fd, retry))
                }
                (result, _) => result.map(|fd| (fd, self.flags)),
            }
        }

        /// [`NvmeChannel::open`] with the `open(2)` call supplied by the caller.
        pub(crate) fn open_with(
            &mut self,
            open_fn: impl FnMut(&str, OFlag) -> nix::Result<RawFd>,
        ) -> Result<()> {
            if self.is_open() {
                return Ok(());
            }
            let (raw, flags) = self.open_fd(open_fn).map_err(|e| DeviceError::OpenFailed {
                path: self.info.path.clone(),
                source: e.into(),
            })?;
            // SAFETY: `raw` was just returned by open(2) and is owned by nobody else.
            let fd = unsafe { OwnedFd::from_raw_fd(raw) };

            // Keep the descriptor out of child processes.
            if let Err(e) = fcntl(fd.as_raw_fd(), FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC)) {
                log::warn!("{}: failed to set FD_CLOEXEC: {e}", self.info.path);
            }

            if self.requested_nsid == 0 {
                self.nsid = Self::query_namespace_id(fd.as_raw_fd());
                log::debug!("{}: namespace id 0x{:X}", self.info.path, self.nsid);
            }

            self.state = ChannelState::Open { fd, flags };
            Ok(())
        }

        /// Ask the driver which namespace this node addresses.  The raw
        /// return value is adopted even when the ioctl fails, so a
        /// controller node ends up with -1, i.e. the broadcast namespace.
        fn query_namespace_id(fd: RawFd) -> u32 {
            // SAFETY: NVME_IOCTL_ID takes no argument; `fd` is a valid open descriptor.
            let raw = match unsafe { nvme_ioctl_id(fd) } {
                Ok(id) => id,
                Err(e) => {
                    log::debug!("NVME_IOCTL_ID: {e}");
                    -1
                }
            };
            raw as u32
        }
    }

    impl NvmeChannel for LinuxDevice {
        fn info(&self) -> &DeviceInfo {
            &self.info
        }

        fn is_open(&self) -> bool {
            matches!(self.state, ChannelState::Open { .. })
        }

        fn open(&mut self) -> Result<()> {
            self.open_with(|path, flags| open(path, flags, Mode::empty()))
        }

        fn close(&mut self) {
            if let ChannelState::Open { fd, .. } =
                std::mem::replace(&mut self.state, ChannelState::Closed)
                && let Err(e) = nix::unistd::close(fd.into_raw_fd())
            {
                log::warn!("{}: close failed: {e}", self.info.path);
            }
        }

        fn namespace_id(&self) -> u32 {
            self.nsid
        }

        fn submit(&self, cmd: &mut AdminCommand<'_>) -> Result<CommandCompletion> {
            let fd = self.raw_fd().ok_or(DeviceError::NotOpen)?;
            let mut pt = cmd.to_passthru();
            log::debug!(
                "{}: admin {} nsid={} cdw10=0x{:X} len={}",
                self.info.path,
                cmd.opcode(),
                pt.nsid,
                pt.cdw10,
                pt.data_len
            );
            // SAFETY: `pt` is a correctly laid out nvme_passthru_cmd whose
            // addr/data_len describe the buffer borrowed by `cmd`, which
            // stays alive and exclusively borrowed for this call.
            let status = unsafe { nvme_ioctl_admin_cmd(fd, &mut pt) }
                .map_err(|e| DeviceError::SubmitFailed(format!("NVME_IOCTL_ADMIN_CMD: {e}")))?;
            if status > 0 {
                return Err(DeviceError::CommandStatus(status as u32));
            }
            Ok(CommandCompletion { result: pt.result })
        }
    }
}

#[cfg(target_os = "linux")]
pub use linux_impl::LinuxDevice;

// ── Stub (unsupported platforms) ──

#[cfg(not(target_os = "linux"))]
pub struct StubDevice {
    info: DeviceInfo,
    nsid: u32,
}

#[cfg(not(target_os = "linux"))]
impl StubDevice {
    pub fn new(path: &str, options: ChannelOptions) -> Self {
        StubDevice {
            info: DeviceInfo::new(path),
            nsid: options.namespace_id,
        }
    }
}

#[cfg(not(target_os = "linux"))]
impl NvmeChannel for StubDevice {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }
    fn is_open(&self) -> bool {
        false
    }
    fn open(&mut self) -> Result<()> {
        Err(DeviceError::Unsupported)
    }
    fn close(&mut self) {}
    fn namespace_id(&self) -> u32 {
        self.nsid
    }
    fn submit(&self, _cmd: &mut AdminCommand<'_>) -> Result<CommandCompletion> {
        Err(DeviceError::NotOpen)
    }
}

/// Concrete channel type for the current platform.
#[cfg(target_os = "linux")]
pub type PlatformDevice = LinuxDevice;
#[cfg(not(target_os = "linux"))]
pub type PlatformDevice = StubDevice;

/// Create and open the platform channel for `path`.
pub fn open_device(path: &str, options: ChannelOptions) -> Result<PlatformDevice> {
    let mut dev = PlatformDevice::new(path, options);
    dev.open()?;
    Ok(dev)
}

// ── Mock channel for testing ──

/// In-memory mock channel for unit and integration tests.
#[doc(hidden)]
pub mod mock {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;

    use crate::command::DataTransfer;
    use crate::protocol::{AdminOpcode, DataDirection};

    /// Scripted outcome of one `submit` call.
    #[derive(Debug, Clone)]
    pub enum MockResponse {
        /// Success; bytes are copied into the command's data-in buffer.
        Data(Vec<u8>),
        /// Controller status field (non-zero).
        Status(u32),
        /// The ioctl itself failed.
        SysError(String),
    }

    /// What the mock saw for one submitted command.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct SubmittedCommand {
        pub opcode: AdminOpcode,
        pub nsid: u32,
        pub cdw10: u32,
        pub direction: DataDirection,
        pub data_len: usize,
        pub timeout_ms: u32,
    }

    pub struct MockChannel {
        info: DeviceInfo,
        open: Cell<bool>,
        requested_nsid: u32,
        nsid: Cell<u32>,
        /// Value the mock reports for the namespace id query.
        pub reported_nsid: Cell<u32>,
        /// If true, `open` fails with a not-found error.
        pub fail_open: Cell<bool>,
        /// Responses consumed in order by `submit`.
        pub responses: RefCell<VecDeque<MockResponse>>,
        /// Recorded submissions.
        pub submitted: RefCell<Vec<SubmittedCommand>>,
        /// Number of `close` calls on an open channel.
        pub closes: Cell<usize>,
    }

    impl Default for MockChannel {
        fn default() -> Self {
            Self::new()
        }
    }

    impl MockChannel {
        pub fn new() -> Self {
            Self::with_options(ChannelOptions::default())
        }

        pub fn with_options(options: ChannelOptions) -> Self {
            MockChannel {
                info: DeviceInfo::new("mock://nvme0"),
                open: Cell::new(false),
                requested_nsid: options.namespace_id,
                nsid: Cell::new(options.namespace_id),
                reported_nsid: Cell::new(1),
                fail_open: Cell::new(false),
                responses: RefCell::new(VecDeque::new()),
                submitted: RefCell::new(Vec::new()),
                closes: Cell::new(0),
            }
        }

        pub fn push_response(&self, response: MockResponse) {
            self.responses.borrow_mut().push_back(response);
        }
    }

    impl NvmeChannel for MockChannel {
        fn info(&self) -> &DeviceInfo {
            &self.info
        }

        fn is_open(&self) -> bool {
            self.open.get()
        }

        fn open(&mut self) -> Result<()> {
            if self.fail_open.get() {
                return Err(DeviceError::OpenFailed {
                    path: self.info.path.clone(),
                    source: std::io::Error::from(std::io::ErrorKind::NotFound),
                });
            }
            if self.requested_nsid == 0 {
                self.nsid.set(self.reported_nsid.get());
            }
            self.open.set(true);
            Ok(())
        }

        fn close(&mut self) {
            if self.open.replace(false) {
                self.closes.set(self.closes.get() + 1);
            }
        }

        fn namespace_id(&self) -> u32 {
            self.nsid.get()
        }

        fn submit(&self, cmd: &mut AdminCommand<'_>) -> Result<CommandCompletion> {
            if !self.open.get() {
                return Err(DeviceError::NotOpen);
            }
            self.submitted.borrow_mut().push(SubmittedCommand {
                opcode: cmd.opcode(),
                nsid: cmd.nsid,
                cdw10: cmd.cdw10,
                direction: cmd.direction(),
                data_len: cmd.data().len(),
                timeout_ms: cmd.timeout_ms,
            });
            let response = self.responses.borrow_mut().pop_front();
            match response {
                Some(MockResponse::Data(bytes)) => {
                    if let DataTransfer::In(buf) | DataTransfer::Bidirectional(buf) =
                        cmd.data_mut()
                    {
                        let n = bytes.len().min(buf.len());
                        buf[..n].copy_from_slice(&bytes[..n]);
                    }
                    Ok(CommandCompletion::default())
                }
                Some(MockResponse::Status(s)) => Err(DeviceError::CommandStatus(s)),
                Some(MockResponse::SysError(e)) => Err(DeviceError::SubmitFailed(e)),
                None => Err(DeviceError::SubmitFailed(format!(
                    "no mock response for opcode {}",
                    cmd.opcode()
                ))),
            }
        }
    }
}
