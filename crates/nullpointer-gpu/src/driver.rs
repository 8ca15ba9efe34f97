//! The seam between the bring-up logic and the Vulkan driver.
//!
//! Each trait mirrors one dispatch level of the Vulkan API. The bring-up
//! functions in this crate are generic over them; [`crate::native`] implements
//! them with `ash`. Implementations only ever receive handles that they
//! produced themselves, so the methods are safe to call.

use ash::prelude::VkResult;
use ash::vk;

use crate::command::Submission;
use crate::device::DeviceCreateRequest;
use crate::instance::InstanceRequest;
use crate::swapchain::SwapchainDescriptor;

/// Global-level entry points (no instance yet).
pub trait EntryApi {
    type Instance: InstanceApi;

    fn instance_extensions(&self) -> VkResult<Vec<vk::ExtensionProperties>>;

    fn instance_layers(&self) -> VkResult<Vec<vk::LayerProperties>>;

    fn create_instance(&self, request: &InstanceRequest) -> VkResult<Self::Instance>;
}

/// Instance-level entry points: physical devices and surfaces.
pub trait InstanceApi {
    type Device: DeviceApi;

    fn physical_devices(&self) -> VkResult<Vec<vk::PhysicalDevice>>;

    fn device_extensions(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> VkResult<Vec<vk::ExtensionProperties>>;

    fn device_features(&self, physical_device: vk::PhysicalDevice) -> vk::PhysicalDeviceFeatures;

    fn device_properties(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> vk::PhysicalDeviceProperties;

    fn queue_family_properties(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> Vec<vk::QueueFamilyProperties>;

    fn surface_support(
        &self,
        physical_device: vk::PhysicalDevice,
        queue_family: u32,
        surface: vk::SurfaceKHR,
    ) -> VkResult<bool>;

    fn surface_capabilities(
        &self,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> VkResult<vk::SurfaceCapabilitiesKHR>;

    fn surface_formats(
        &self,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> VkResult<Vec<vk::SurfaceFormatKHR>>;

    fn surface_present_modes(
        &self,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> VkResult<Vec<vk::PresentModeKHR>>;

    fn create_device(
        &self,
        physical_device: vk::PhysicalDevice,
        request: &DeviceCreateRequest<'_>,
    ) -> VkResult<Self::Device>;
}

/// Device-level entry points.
///
/// Calls on a single queue must be serialized by the caller.
pub trait DeviceApi {
    fn queue(&self, family_index: u32, queue_index: u32) -> vk::Queue;

    fn wait_idle(&self) -> VkResult<()>;

    /// Destroy the device.
    ///
    /// # Safety
    /// Called at most once, after every object created from the device is
    /// destroyed. [`crate::LogicalDevice`]'s drop is the only caller.
    unsafe fn destroy(&mut self);

    fn create_swapchain(
        &self,
        descriptor: &SwapchainDescriptor,
        old_swapchain: vk::SwapchainKHR,
    ) -> VkResult<vk::SwapchainKHR>;

    /// # Safety
    /// `swapchain` must come from this device, must not be destroyed twice,
    /// and none of its images may be in use.
    unsafe fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR);

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>>;

    /// Returns the image index and whether the swapchain is suboptimal.
    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        timeout_ns: u64,
        semaphore: vk::Semaphore,
        fence: vk::Fence,
    ) -> VkResult<(u32, bool)>;

    /// Returns whether any target swapchain is suboptimal.
    fn queue_present(
        &self,
        queue: vk::Queue,
        wait_semaphores: &[vk::Semaphore],
        swapchains: &[vk::SwapchainKHR],
        image_indices: &[u32],
    ) -> VkResult<bool>;

    fn queue_submit(
        &self,
        queue: vk::Queue,
        submission: &Submission<'_>,
        fence: vk::Fence,
    ) -> VkResult<()>;

    fn create_semaphore(&self) -> VkResult<vk::Semaphore>;

    /// # Safety
    /// `semaphore` must come from this device, must not be destroyed twice,
    /// and must not be pending on any queue.
    unsafe fn destroy_semaphore(&self, semaphore: vk::Semaphore);

    fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence>;

    /// # Safety
    /// `fence` must come from this device, must not be destroyed twice, and
    /// must not be pending on any queue.
    unsafe fn destroy_fence(&self, fence: vk::Fence);

    fn fence_status(&self, fence: vk::Fence) -> VkResult<bool>;

    fn wait_for_fences(&self, fences: &[vk::Fence], wait_all: bool, timeout_ns: u64)
        -> VkResult<()>;

    fn reset_fences(&self, fences: &[vk::Fence]) -> VkResult<()>;
}
