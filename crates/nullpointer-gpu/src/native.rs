//! The driver traits implemented over `ash`.
//!
//! Every `unsafe` call here operates on handles created through the same
//! objects, and the owning types destroy them in dependency order.

use std::ffi::{c_char, CString};

use ash::prelude::VkResult;
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use crate::command::Submission;
use crate::device::DeviceCreateRequest;
use crate::driver::{DeviceApi, EntryApi, InstanceApi};
use crate::error::{GpuError, Result};
use crate::instance::InstanceRequest;
use crate::swapchain::SwapchainDescriptor;

/// The Vulkan loader.
#[derive(Clone)]
pub struct NativeEntry {
    entry: ash::Entry,
}

impl NativeEntry {
    /// Get the Vulkan entry points.
    ///
    /// With the `linked` feature the loader is linked at build time,
    /// otherwise the system loader library is opened at runtime.
    pub fn new() -> Result<Self> {
        #[cfg(feature = "linked")]
        let entry = ash::Entry::linked();

        // SAFETY: the loaded library is kept alive by `ash::Entry`, which every
        // instance created from it holds a clone of.
        #[cfg(not(feature = "linked"))]
        let entry = unsafe { ash::Entry::load() }
            .map_err(|e| GpuError::Loading(format!("Failed to load Vulkan entry: {e}")))?;

        Ok(Self { entry })
    }

    pub fn raw(&self) -> &ash::Entry {
        &self.entry
    }
}

impl std::fmt::Debug for NativeEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeEntry").finish_non_exhaustive()
    }
}

fn name_ptrs(names: &[CString]) -> Vec<*const c_char> {
    names.iter().map(|name| name.as_ptr()).collect()
}

impl EntryApi for NativeEntry {
    type Instance = NativeInstance;

    fn instance_extensions(&self) -> VkResult<Vec<vk::ExtensionProperties>> {
        unsafe { self.entry.enumerate_instance_extension_properties(None) }
    }

    fn instance_layers(&self) -> VkResult<Vec<vk::LayerProperties>> {
        unsafe { self.entry.enumerate_instance_layer_properties() }
    }

    fn create_instance(&self, request: &InstanceRequest) -> VkResult<NativeInstance> {
        let app_info = vk::ApplicationInfo::default()
            .application_name(&request.app_name)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(&request.engine_name)
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(request.api_version);

        let extension_names = name_ptrs(&request.extensions);
        let layer_names = name_ptrs(&request.layers);

        // Required for MoltenVK on macOS
        let portability = request
            .extensions
            .iter()
            .any(|name| name.as_c_str() == ash::khr::portability_enumeration::NAME);
        let create_flags = if portability {
            vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR
        } else {
            vk::InstanceCreateFlags::empty()
        };

        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extension_names)
            .enabled_layer_names(&layer_names)
            .flags(create_flags);

        // SAFETY: every pointer in `create_info` borrows from `request` or
        // locals that outlive the call.
        let instance = unsafe { self.entry.create_instance(&create_info, None)? };
        let surface_loader = ash::khr::surface::Instance::new(&self.entry, &instance);

        Ok(NativeInstance {
            entry: self.entry.clone(),
            instance,
            surface_loader,
        })
    }
}

/// A Vulkan instance. Destroyed on drop.
///
/// Surfaces and devices created from it must be dropped first.
pub struct NativeInstance {
    entry: ash::Entry,
    instance: ash::Instance,
    surface_loader: ash::khr::surface::Instance,
}

impl NativeInstance {
    pub fn raw(&self) -> &ash::Instance {
        &self.instance
    }

    pub fn entry(&self) -> &ash::Entry {
        &self.entry
    }

    /// Create a presentation surface for a window.
    ///
    /// The instance must have been created with the extensions reported by
    /// [`crate::wsi_instance_extensions`] for the window's display.
    pub fn create_surface<W>(&self, window: &W) -> Result<NativeSurface>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        let display = window
            .display_handle()
            .map_err(|e| GpuError::Surface(format!("Failed to get display handle: {e}")))?;
        let window_handle = window
            .window_handle()
            .map_err(|e| GpuError::Surface(format!("Failed to get window handle: {e}")))?;

        // SAFETY: the handles come from a live window borrowed for the call.
        let handle = unsafe {
            ash_window::create_surface(
                &self.entry,
                &self.instance,
                display.as_raw(),
                window_handle.as_raw(),
                None,
            )
        }
        .map_err(|e| GpuError::Surface(e.to_string()))?;

        Ok(NativeSurface {
            loader: self.surface_loader.clone(),
            handle,
        })
    }
}

impl Drop for NativeInstance {
    fn drop(&mut self) {
        unsafe { self.instance.destroy_instance(None) };
    }
}

impl std::fmt::Debug for NativeInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeInstance")
            .field("handle", &self.instance.handle())
            .finish_non_exhaustive()
    }
}

impl InstanceApi for NativeInstance {
    type Device = NativeDevice;

    fn physical_devices(&self) -> VkResult<Vec<vk::PhysicalDevice>> {
        unsafe { self.instance.enumerate_physical_devices() }
    }

    fn device_extensions(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> VkResult<Vec<vk::ExtensionProperties>> {
        unsafe {
            self.instance
                .enumerate_device_extension_properties(physical_device)
        }
    }

    fn device_features(&self, physical_device: vk::PhysicalDevice) -> vk::PhysicalDeviceFeatures {
        unsafe { self.instance.get_physical_device_features(physical_device) }
    }

    fn device_properties(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> vk::PhysicalDeviceProperties {
        unsafe { self.instance.get_physical_device_properties(physical_device) }
    }

    fn queue_family_properties(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> Vec<vk::QueueFamilyProperties> {
        unsafe {
            self.instance
                .get_physical_device_queue_family_properties(physical_device)
        }
    }

    fn surface_support(
        &self,
        physical_device: vk::PhysicalDevice,
        queue_family: u32,
        surface: vk::SurfaceKHR,
    ) -> VkResult<bool> {
        unsafe {
            self.surface_loader.get_physical_device_surface_support(
                physical_device,
                queue_family,
                surface,
            )
        }
    }

    fn surface_capabilities(
        &self,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> VkResult<vk::SurfaceCapabilitiesKHR> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_capabilities(physical_device, surface)
        }
    }

    fn surface_formats(
        &self,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> VkResult<Vec<vk::SurfaceFormatKHR>> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_formats(physical_device, surface)
        }
    }

    fn surface_present_modes(
        &self,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> VkResult<Vec<vk::PresentModeKHR>> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_present_modes(physical_device, surface)
        }
    }

    fn create_device(
        &self,
        physical_device: vk::PhysicalDevice,
        request: &DeviceCreateRequest<'_>,
    ) -> VkResult<NativeDevice> {
        let queue_create_infos: Vec<_> = request
            .queues
            .iter()
            .map(|queue| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(queue.family_index)
                    .queue_priorities(&queue.priorities)
            })
            .collect();

        let extension_names = name_ptrs(request.extensions);

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extension_names)
            .enabled_features(&request.features);

        // SAFETY: `physical_device` was enumerated from this instance and the
        // create info only borrows from `request` and locals.
        let device = unsafe {
            self.instance
                .create_device(physical_device, &create_info, None)?
        };

        let swapchain_enabled = request
            .extensions
            .iter()
            .any(|name| name.as_c_str() == ash::khr::swapchain::NAME);
        let swapchain_loader =
            swapchain_enabled.then(|| ash::khr::swapchain::Device::new(&self.instance, &device));

        Ok(NativeDevice {
            device,
            swapchain_loader,
        })
    }
}

/// A presentation surface. Destroyed on drop.
///
/// Must be dropped after every swapchain built on it and before the
/// [`NativeInstance`] it came from.
pub struct NativeSurface {
    loader: ash::khr::surface::Instance,
    handle: vk::SurfaceKHR,
}

impl NativeSurface {
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }
}

impl Drop for NativeSurface {
    fn drop(&mut self) {
        unsafe { self.loader.destroy_surface(self.handle, None) };
    }
}

impl std::fmt::Debug for NativeSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeSurface")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

/// A Vulkan logical device.
///
/// Owned by [`crate::LogicalDevice`], which destroys it.
pub struct NativeDevice {
    device: ash::Device,
    swapchain_loader: Option<ash::khr::swapchain::Device>,
}

impl NativeDevice {
    pub fn raw(&self) -> &ash::Device {
        &self.device
    }

    fn swapchain_loader(&self) -> VkResult<&ash::khr::swapchain::Device> {
        self.swapchain_loader
            .as_ref()
            .ok_or(vk::Result::ERROR_EXTENSION_NOT_PRESENT)
    }
}

impl std::fmt::Debug for NativeDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeDevice")
            .field("handle", &self.device.handle())
            .field("swapchain", &self.swapchain_loader.is_some())
            .finish()
    }
}

impl DeviceApi for NativeDevice {
    fn queue(&self, family_index: u32, queue_index: u32) -> vk::Queue {
        unsafe { self.device.get_device_queue(family_index, queue_index) }
    }

    fn wait_idle(&self) -> VkResult<()> {
        unsafe { self.device.device_wait_idle() }
    }

    unsafe fn destroy(&mut self) {
        unsafe { self.device.destroy_device(None) };
    }

    fn create_swapchain(
        &self,
        descriptor: &SwapchainDescriptor,
        old_swapchain: vk::SwapchainKHR,
    ) -> VkResult<vk::SwapchainKHR> {
        let loader = self.swapchain_loader()?;

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(descriptor.surface)
            .min_image_count(descriptor.image_count)
            .image_format(descriptor.format)
            .image_color_space(descriptor.color_space)
            .image_extent(descriptor.extent)
            .image_array_layers(1)
            .image_usage(descriptor.usage)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(descriptor.transform)
            .composite_alpha(descriptor.composite_alpha)
            .present_mode(descriptor.present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        unsafe { loader.create_swapchain(&create_info, None) }
    }

    unsafe fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        if let Ok(loader) = self.swapchain_loader() {
            unsafe { loader.destroy_swapchain(swapchain, None) };
        }
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
        let loader = self.swapchain_loader()?;
        unsafe { loader.get_swapchain_images(swapchain) }
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        timeout_ns: u64,
        semaphore: vk::Semaphore,
        fence: vk::Fence,
    ) -> VkResult<(u32, bool)> {
        let loader = self.swapchain_loader()?;
        unsafe { loader.acquire_next_image(swapchain, timeout_ns, semaphore, fence) }
    }

    fn queue_present(
        &self,
        queue: vk::Queue,
        wait_semaphores: &[vk::Semaphore],
        swapchains: &[vk::SwapchainKHR],
        image_indices: &[u32],
    ) -> VkResult<bool> {
        let loader = self.swapchain_loader()?;
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(wait_semaphores)
            .swapchains(swapchains)
            .image_indices(image_indices);

        unsafe { loader.queue_present(queue, &present_info) }
    }

    fn queue_submit(
        &self,
        queue: vk::Queue,
        submission: &Submission<'_>,
        fence: vk::Fence,
    ) -> VkResult<()> {
        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&submission.wait_semaphores)
            .wait_dst_stage_mask(&submission.wait_stages)
            .command_buffers(submission.command_buffers)
            .signal_semaphores(submission.signal_semaphores);

        unsafe { self.device.queue_submit(queue, &[submit_info], fence) }
    }

    fn create_semaphore(&self) -> VkResult<vk::Semaphore> {
        let create_info = vk::SemaphoreCreateInfo::default();
        unsafe { self.device.create_semaphore(&create_info, None) }
    }

    unsafe fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        unsafe { self.device.destroy_semaphore(semaphore, None) };
    }

    fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::default().flags(flags);
        unsafe { self.device.create_fence(&create_info, None) }
    }

    unsafe fn destroy_fence(&self, fence: vk::Fence) {
        unsafe { self.device.destroy_fence(fence, None) };
    }

    fn fence_status(&self, fence: vk::Fence) -> VkResult<bool> {
        unsafe { self.device.get_fence_status(fence) }
    }

    fn wait_for_fences(
        &self,
        fences: &[vk::Fence],
        wait_all: bool,
        timeout_ns: u64,
    ) -> VkResult<()> {
        unsafe { self.device.wait_for_fences(fences, wait_all, timeout_ns) }
    }

    fn reset_fences(&self, fences: &[vk::Fence]) -> VkResult<()> {
        unsafe { self.device.reset_fences(fences) }
    }
}

