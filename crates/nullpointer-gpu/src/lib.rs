//! Vulkan bring-up for the Nullpointer engine.
//!
//! This crate provides:
//! - Extension and layer catalogs
//! - Instance creation and physical device selection
//! - Queue family resolution and logical device creation
//! - Surface capability negotiation and swapchain management
//! - Submission and synchronization wrappers
//!
//! The bring-up steps are generic over the [`driver`] traits; [`native`]
//! implements them with `ash`.

pub mod capabilities;
pub mod catalog;
pub mod command;
pub mod context;
pub mod device;
pub mod driver;
pub mod error;
pub mod instance;
pub mod native;
pub mod queue;
pub mod surface;
pub mod swapchain;
pub mod sync;

#[cfg(test)]
mod testing;

pub use capabilities::{DeviceFeatures, DeviceSummary, GpuVendor};
pub use catalog::{
    query_device_extensions, query_instance_extensions, query_instance_layers, ExtensionCatalog,
    ExtensionRecord,
};
pub use command::{submit, Submission};
pub use context::{bring_up, BringUp, GpuContext, GpuContextBuilder};
pub use device::{create_logical_device, create_logical_device_with_wsi, LogicalDevice};
pub use error::{GpuError, Result};
pub use instance::{
    create_instance, enumerate_devices, select_device, wsi_instance_extensions,
    DeviceRequirements, InstanceRequest,
};
pub use native::{NativeDevice, NativeEntry, NativeInstance, NativeSurface};
pub use queue::{QueueFamilyDescriptor, QueueFamilyIndices, QueueRequest, QueueRequests};
pub use surface::SurfaceCapabilities;
pub use swapchain::{
    acquire_next_image, present, AcquiredImage, Swapchain, SwapchainConfig, SwapchainDescriptor,
};
pub use sync::{
    create_fence, create_semaphore, destroy_fence, destroy_semaphore, fence_signaled,
    reset_fences, wait_for_fence, wait_for_fences, FrameSync, FrameSyncManager,
};
