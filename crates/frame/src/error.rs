//! Errors raised by the frame loop.

use std::time::Duration;

use ash::vk;
use pacer_rhi::RhiError;
use thiserror::Error;

/// Frame loop error.
///
/// Everything except [`FrameError::OutOfDate`] is fatal: the caller should
/// log it, shut the scheduler down and exit.
#[derive(Error, Debug)]
pub enum FrameError {
    /// The presentation target no longer matches the surface.
    #[error("presentation target is out of date")]
    OutOfDate,

    /// A bounded GPU wait expired. Treated as a device hang.
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    #[error("device lost during {operation}")]
    DeviceLost { operation: &'static str },

    /// A native API call failed with `code`.
    #[error("{operation} failed: {name} ({code})")]
    Native {
        operation: &'static str,
        code: i32,
        name: String,
    },

    /// A wrapper in the RHI layer failed without a native result code.
    #[error("{operation} failed: {source}")]
    Rhi {
        operation: &'static str,
        #[source]
        source: RhiError,
    },

    /// The frame API was driven out of order.
    #[error("invalid frame state: {0}")]
    InvalidState(String),
}

impl FrameError {
    #[inline]
    pub fn is_fatal(&self) -> bool {
        !matches!(self, FrameError::OutOfDate)
    }

    /// Operation that failed, when known.
    pub fn operation(&self) -> Option<&'static str> {
        match self {
            FrameError::Timeout { operation, .. }
            | FrameError::DeviceLost { operation }
            | FrameError::Native { operation, .. }
            | FrameError::Rhi { operation, .. } => Some(*operation),
            FrameError::OutOfDate | FrameError::InvalidState(_) => None,
        }
    }

    /// Raw native result code, when the failure carried one.
    pub fn native_code(&self) -> Option<i32> {
        match self {
            FrameError::Native { code, .. } => Some(*code),
            FrameError::DeviceLost { .. } => Some(vk::Result::ERROR_DEVICE_LOST.as_raw()),
            FrameError::Rhi { source, .. } => source.vk_result().map(vk::Result::as_raw),
            _ => None,
        }
    }

    /// Classifies a Vulkan result code returned by `operation`.
    ///
    /// `timeout` is reported for `TIMEOUT`/`NOT_READY`, which only come
    /// back from bounded waits.
    pub fn from_vk(operation: &'static str, timeout: Duration, result: vk::Result) -> Self {
        match result {
            vk::Result::ERROR_DEVICE_LOST => FrameError::DeviceLost { operation },
            vk::Result::ERROR_OUT_OF_DATE_KHR => FrameError::OutOfDate,
            vk::Result::TIMEOUT | vk::Result::NOT_READY => FrameError::Timeout { operation, timeout },
            other => FrameError::Native {
                operation,
                code: other.as_raw(),
                name: format!("{:?}", other),
            },
        }
    }

    /// Wraps an RHI error, unpacking native result codes.
    pub fn from_rhi(operation: &'static str, error: RhiError) -> Self {
        match error.vk_result() {
            Some(result) => Self::from_vk(operation, Duration::ZERO, result),
            None => FrameError::Rhi {
                operation,
                source: error,
            },
        }
    }
}

pub type FrameResult<T> = std::result::Result<T, FrameError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_out_of_date_is_recoverable() {
        assert!(!FrameError::OutOfDate.is_fatal());
        assert!(FrameError::DeviceLost { operation: "present" }.is_fatal());
        assert!(FrameError::InvalidState("stale".into()).is_fatal());
        assert!(
            FrameError::Timeout {
                operation: "frame fence wait",
                timeout: Duration::from_secs(1),
            }
            .is_fatal()
        );
    }

    #[test]
    fn test_vk_device_lost_maps_to_device_lost() {
        let err = FrameError::from_vk("submit", Duration::ZERO, vk::Result::ERROR_DEVICE_LOST);
        assert!(matches!(err, FrameError::DeviceLost { operation: "submit" }));
        assert_eq!(err.native_code(), Some(-4));
    }

    #[test]
    fn test_vk_other_keeps_native_code() {
        let err = FrameError::from_vk(
            "create fence",
            Duration::ZERO,
            vk::Result::ERROR_OUT_OF_HOST_MEMORY,
        );
        match err {
            FrameError::Native { operation, code, ref name } => {
                assert_eq!(operation, "create fence");
                assert_eq!(code, vk::Result::ERROR_OUT_OF_HOST_MEMORY.as_raw());
                assert_eq!(name, "ERROR_OUT_OF_HOST_MEMORY");
            }
            other => panic!("unexpected mapping: {:?}", other),
        }
    }

    #[test]
    fn test_rhi_error_without_code_is_wrapped() {
        let err = FrameError::from_rhi("swapchain recreate", RhiError::NoSuitableGpu);
        assert!(matches!(err, FrameError::Rhi { .. }));
        assert_eq!(err.operation(), Some("swapchain recreate"));
        assert_eq!(err.native_code(), None);
    }

    #[test]
    fn test_rhi_error_with_code_is_unpacked() {
        let err = FrameError::from_rhi(
            "swapchain recreate",
            RhiError::VulkanError(vk::Result::ERROR_OUT_OF_DATE_KHR),
        );
        assert!(matches!(err, FrameError::OutOfDate));
    }
}
