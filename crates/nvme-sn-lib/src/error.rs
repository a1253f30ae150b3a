//! Unified error type for the nvme-sn-lib crate.
//!
//! [`NvmeSnError`] wraps [`DeviceError`] and I/O errors plus configuration
//! problems.  `From` impls allow `?` to propagate across module boundaries.

use std::fmt;

use crate::device::DeviceError;

/// Unified error type for nvme-sn-lib operations.
#[derive(Debug)]
pub enum NvmeSnError {
    /// Device channel error (open, submit, command status).
    Device(DeviceError),
    /// Standard I/O error (config persistence).
    Io(std::io::Error),
    /// Configuration error.
    Config(String),
}

impl NvmeSnError {
    /// True when the device node could not be opened at all, as opposed to
    /// a device that opened but failed the query.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            NvmeSnError::Device(DeviceError::OpenFailed { .. } | DeviceError::Unsupported)
        )
    }
}

impl fmt::Display for NvmeSnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NvmeSnError::Device(e) => write!(f, "{e}"),
            NvmeSnError::Io(e) => write!(f, "I/O error: {e}"),
            NvmeSnError::Config(e) => write!(f, "Config error: {e}"),
        }
    }
}

impl std::error::Error for NvmeSnError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            NvmeSnError::Device(e) => Some(e),
            NvmeSnError::Io(e) => Some(e),
            NvmeSnError::Config(_) => None,
        }
    }
}

impl From<DeviceError> for NvmeSnError {
    fn from(e: DeviceError) -> Self {
        NvmeSnError::Device(e)
    }
}

impl From<std::io::Error> for NvmeSnError {
    fn from(e: std::io::Error) -> Self {
        NvmeSnError::Io(e)
    }
}

/// Crate-level Result alias using [`NvmeSnError`].
pub type Result<T> = std::result::Result<T, NvmeSnError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn open_failed() -> DeviceError {
        DeviceError::OpenFailed {
            path: "/dev/nvme7".into(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        }
    }

    #[test]
    fn from_device_error() {
        let e: NvmeSnError = DeviceError::NotOpen.into();
        assert!(matches!(e, NvmeSnError::Device(DeviceError::NotOpen)));
    }

    #[test]
    fn from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let e: NvmeSnError = io_err.into();
        assert!(matches!(e, NvmeSnError::Io(_)));
    }

    #[test]
    fn display_device_error() {
        let e = NvmeSnError::Device(DeviceError::Unsupported);
        assert_eq!(
            e.to_string(),
            "NVMe pass-through is not supported on this platform"
        );
    }

    #[test]
    fn display_config_error() {
        let e = NvmeSnError::Config("bad open_mode".into());
        assert_eq!(e.to_string(), "Config error: bad open_mode");
    }

    #[test]
    fn not_found_only_for_open_failures() {
        assert!(NvmeSnError::Device(open_failed()).is_not_found());
        assert!(NvmeSnError::Device(DeviceError::Unsupported).is_not_found());
        assert!(!NvmeSnError::Device(DeviceError::CommandStatus(2)).is_not_found());
        assert!(!NvmeSnError::Device(DeviceError::SubmitFailed("x".into())).is_not_found());
        assert!(!NvmeSnError::Config("x".into()).is_not_found());
    }

    #[test]
    fn source_chains_through_device_error() {
        let e = NvmeSnError::Device(open_failed());
        let source = std::error::Error::source(&e).unwrap();
        assert!(source.to_string().contains("/dev/nvme7"));
        let inner = source.source().unwrap();
        assert!(inner.to_string().contains("missing"));
    }

    #[test]
    fn source_none_for_config() {
        let e = NvmeSnError::Config("test".into());
        assert!(std::error::Error::source(&e).is_none());
    }

    #[test]
    fn question_mark_propagation_device_to_crate() {
        fn inner() -> crate::device::Result<()> {
            Err(DeviceError::NotOpen)
        }
        fn outer() -> Result<()> {
            inner()?;
            Ok(())
        }
        let err = outer().unwrap_err();
        assert!(matches!(err, NvmeSnError::Device(DeviceError::NotOpen)));
    }
}
