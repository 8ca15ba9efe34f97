//! GPU error types.

use ash::vk;
use thiserror::Error;

/// Errors produced by the bring-up sequence.
#[derive(Error, Debug)]
pub enum GpuError {
    /// An enumeration call failed or returned an unexpectedly empty result.
    #[error("Query failed: {what} ({result:?})")]
    QueryFailed {
        /// What was being enumerated.
        what: &'static str,
        /// The native result, `None` when the call succeeded but returned nothing.
        result: Option<vk::Result>,
    },

    /// The instance reported no physical devices.
    #[error("No physical devices found")]
    NoDevicesFound,

    /// Nothing satisfies the stated requirements.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A requested extension is not in the catalog.
    #[error("Required extension not supported: {0}")]
    UnsupportedExtension(String),

    /// The surface cannot provide every requested image usage.
    #[error("Unsupported image usage: requested {desired:?}, surface supports {supported:?}")]
    UnsupportedUsage {
        desired: vk::ImageUsageFlags,
        supported: vk::ImageUsageFlags,
    },

    /// `vkCreateDevice` failed.
    #[error("Logical device creation failed: {0}")]
    DeviceCreationFailed(vk::Result),

    /// A native resource-creation call failed.
    #[error("Failed to create {what}: {result}")]
    CreationFailed {
        what: &'static str,
        result: vk::Result,
    },

    /// The swapchain exists but its images could not be retrieved.
    ///
    /// The swapchain is still alive; the caller owns `swapchain` and must
    /// retry or destroy it.
    #[error("Swapchain images unavailable: {result:?}")]
    SwapchainImagesUnavailable {
        swapchain: vk::SwapchainKHR,
        result: Option<vk::Result>,
    },

    /// A bounded wait elapsed.
    #[error("Timed out after {timeout_ns} ns")]
    Timeout { timeout_ns: u64 },

    /// The swapchain no longer matches the surface and must be recreated.
    #[error("Swapchain out of date")]
    OutOfDate,

    /// Loading the Vulkan library failed.
    #[error("Failed to load Vulkan: {0}")]
    Loading(String),

    /// Surface creation failed.
    #[error("Surface creation failed: {0}")]
    Surface(String),

    /// The caller passed a malformed request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Vulkan error.
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] vk::Result),
}

impl GpuError {
    /// Whether this error is an elapsed bounded wait.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    pub(crate) fn query(what: &'static str, result: vk::Result) -> Self {
        Self::QueryFailed {
            what,
            result: Some(result),
        }
    }

    pub(crate) fn empty(what: &'static str) -> Self {
        Self::QueryFailed { what, result: None }
    }

    pub(crate) fn creation(what: &'static str, result: vk::Result) -> Self {
        Self::CreationFailed { what, result }
    }
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, GpuError>;
