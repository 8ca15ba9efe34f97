//! GPU context management.
//!
//! [`bring_up`] runs the device half of initialization over any driver.
//! [`GpuContextBuilder`] wraps it with the native loader, instance and
//! window surface, and hands back a [`GpuContext`] that owns all of them.

use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::ffi::CString;

use crate::capabilities::{DeviceFeatures, DeviceSummary};
use crate::catalog::name_of;
use crate::device::{create_logical_device, create_logical_device_with_wsi, LogicalDevice};
use crate::driver::{DeviceApi, InstanceApi};
use crate::error::{GpuError, Result};
use crate::instance::{
    create_instance, enumerate_devices, select_device, to_cstring, validation_layers,
    wsi_instance_extensions, DeviceRequirements, InstanceRequest,
};
use crate::native::{NativeDevice, NativeEntry, NativeInstance, NativeSurface};
use crate::queue::QueueFamilyIndices;
use crate::surface::SurfaceCapabilities;
use crate::swapchain::{Swapchain, SwapchainConfig, SwapchainDescriptor};

/// Everything produced by [`bring_up`].
#[derive(Debug)]
pub struct BringUp<D: DeviceApi> {
    pub physical_device: vk::PhysicalDevice,
    pub summary: DeviceSummary,
    pub families: QueueFamilyIndices,
    pub device: LogicalDevice<D>,
    pub graphics_queue: vk::Queue,
    pub compute_queue: vk::Queue,
    /// Set when the requirements named a surface.
    pub present_queue: Option<vk::Queue>,
}

/// Select a device, resolve its queue families and create the logical device.
///
/// Graphics and compute queues are always required. When the requirements
/// name a surface, a presenting family is required too and the device is
/// created with `VK_KHR_swapchain`.
pub fn bring_up<I: InstanceApi>(
    instance: &I,
    requirements: &DeviceRequirements,
) -> Result<BringUp<I::Device>> {
    let mut requirements = requirements
        .clone()
        .queue_flags(vk::QueueFlags::GRAPHICS)
        .queue_flags(vk::QueueFlags::COMPUTE);
    if requirements.surface.is_some() {
        // Selection must reject devices the WSI device creation would.
        requirements = requirements.extension(name_of(ash::khr::swapchain::NAME));
    }

    let devices = enumerate_devices(instance)?;
    let physical_device = select_device(instance, &devices, &requirements)?;
    let summary = DeviceSummary::query(instance, physical_device);

    let families = QueueFamilyIndices::resolve(instance, physical_device, requirements.surface)?;
    tracing::debug!("Queue families: {families:?}");

    let device = if requirements.surface.is_some() {
        create_logical_device_with_wsi(
            instance,
            physical_device,
            families.requests(),
            &requirements.extensions,
            requirements.features,
        )?
    } else {
        create_logical_device(
            instance,
            physical_device,
            families.requests(),
            &requirements.extensions,
            requirements.features,
        )?
    };

    let graphics_queue = device.queue(families.graphics, 0);
    let compute_queue = device.queue(families.compute, 0);
    let present_queue = families.present.map(|family| device.queue(family, 0));

    Ok(BringUp {
        physical_device,
        summary,
        families,
        device,
        graphics_queue,
        compute_queue,
        present_queue,
    })
}

/// Negotiate a swapchain against the surface's current capabilities.
pub fn negotiate_swapchain<I: InstanceApi>(
    instance: &I,
    physical_device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    config: &SwapchainConfig,
) -> Result<SwapchainDescriptor> {
    SurfaceCapabilities::query(instance, physical_device, surface)?.negotiate(config, surface)
}

/// Negotiate and create a swapchain.
pub fn create_swapchain<I: InstanceApi>(
    instance: &I,
    device: &LogicalDevice<I::Device>,
    surface: vk::SurfaceKHR,
    config: &SwapchainConfig,
) -> Result<Swapchain> {
    let descriptor = negotiate_swapchain(instance, device.physical_device(), surface, config)?;
    Swapchain::create(device, descriptor)
}

/// Renegotiate and replace `swapchain`, e.g. after a resize.
pub fn recreate_swapchain<I: InstanceApi>(
    instance: &I,
    device: &LogicalDevice<I::Device>,
    swapchain: &mut Swapchain,
    config: &SwapchainConfig,
) -> Result<()> {
    let surface = swapchain.descriptor().surface;
    let descriptor = negotiate_swapchain(instance, device.physical_device(), surface, config)?;
    swapchain.recreate(device, descriptor)
}

/// Main GPU context holding Vulkan resources.
///
/// Swapchains and sync primitives created from it must be destroyed before it
/// is dropped. Teardown order is device, surface, instance.
#[derive(Debug)]
pub struct GpuContext {
    physical_device: vk::PhysicalDevice,
    summary: DeviceSummary,
    families: QueueFamilyIndices,
    graphics_queue: vk::Queue,
    compute_queue: vk::Queue,
    present_queue: Option<vk::Queue>,
    // Field order is drop order.
    device: LogicalDevice<NativeDevice>,
    surface: Option<NativeSurface>,
    instance: NativeInstance,
    #[allow(dead_code)]
    entry: NativeEntry,
}

impl GpuContext {
    pub fn instance(&self) -> &NativeInstance {
        &self.instance
    }

    pub fn device(&self) -> &LogicalDevice<NativeDevice> {
        &self.device
    }

    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Identifying information about the selected GPU.
    pub fn summary(&self) -> &DeviceSummary {
        &self.summary
    }

    pub fn queue_families(&self) -> QueueFamilyIndices {
        self.families
    }

    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    pub fn compute_queue(&self) -> vk::Queue {
        self.compute_queue
    }

    /// The presentation queue, if the context was built for a window.
    pub fn present_queue(&self) -> Option<vk::Queue> {
        self.present_queue
    }

    /// The window surface, if the context was built for a window.
    pub fn surface(&self) -> Option<vk::SurfaceKHR> {
        self.surface.as_ref().map(NativeSurface::handle)
    }

    fn require_surface(&self) -> Result<vk::SurfaceKHR> {
        self.surface().ok_or_else(|| {
            GpuError::InvalidRequest("context was built without a window surface".to_string())
        })
    }

    /// Create a swapchain for the window surface.
    pub fn create_swapchain(&self, config: &SwapchainConfig) -> Result<Swapchain> {
        let surface = self.require_surface()?;
        create_swapchain(&self.instance, &self.device, surface, config)
    }

    /// Replace `swapchain` with one matching the surface's current state.
    pub fn recreate_swapchain(
        &self,
        swapchain: &mut Swapchain,
        config: &SwapchainConfig,
    ) -> Result<()> {
        self.require_surface()?;
        recreate_swapchain(&self.instance, &self.device, swapchain, config)
    }

    /// Wait for device to be idle.
    pub fn wait_idle(&self) -> Result<()> {
        self.device.wait_idle()
    }
}

/// Builder for creating a GPU context.
#[derive(Debug, Clone)]
pub struct GpuContextBuilder {
    app_name: String,
    enable_validation: bool,
    instance_extensions: Vec<String>,
    requirements: DeviceRequirements,
}

impl Default for GpuContextBuilder {
    fn default() -> Self {
        Self {
            app_name: "Nullpointer".to_string(),
            enable_validation: cfg!(debug_assertions),
            instance_extensions: Vec::new(),
            requirements: DeviceRequirements::default(),
        }
    }
}

impl GpuContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the application name.
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    /// Enable or disable validation layers.
    pub fn validation(mut self, enable: bool) -> Self {
        self.enable_validation = enable;
        self
    }

    /// Request an additional instance extension.
    pub fn instance_extension(mut self, name: impl Into<String>) -> Self {
        self.instance_extensions.push(name.into());
        self
    }

    /// Require device features.
    pub fn features(mut self, features: DeviceFeatures) -> Self {
        self.requirements.features |= features;
        self
    }

    /// Require a device extension.
    pub fn device_extension(mut self, name: impl Into<String>) -> Self {
        self.requirements = self.requirements.extension(name);
        self
    }

    /// Require a queue family with any of `flags`.
    pub fn queue_flags(mut self, flags: vk::QueueFlags) -> Self {
        self.requirements = self.requirements.queue_flags(flags);
        self
    }

    /// Build a headless context.
    pub fn build(self) -> Result<GpuContext> {
        let entry = NativeEntry::new()?;
        let request = self.instance_request(Vec::new())?;
        let instance = create_instance(&entry, &request)?;
        self.finish(entry, instance, None)
    }

    /// Build a context that can present to `window`.
    pub fn build_for_window<W>(self, window: &W) -> Result<GpuContext>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        let display = window
            .display_handle()
            .map_err(|e| GpuError::Surface(format!("Failed to get display handle: {e}")))?;
        let wsi = wsi_instance_extensions(display.as_raw())?;

        let entry = NativeEntry::new()?;
        let request = self.instance_request(wsi)?;
        let instance = create_instance(&entry, &request)?;
        let surface = instance.create_surface(window)?;
        self.finish(entry, instance, Some(surface))
    }

    fn instance_request(&self, wsi: Vec<CString>) -> Result<InstanceRequest> {
        let extra = self
            .instance_extensions
            .iter()
            .map(|name| to_cstring(name))
            .collect::<Result<Vec<_>>>()?;

        let mut request = InstanceRequest::new(&self.app_name)?
            .with_extensions(wsi)
            .with_extensions(extra);

        if self.enable_validation {
            request = request.with_layers(validation_layers().into_iter().map(ToOwned::to_owned));
        }
        Ok(request)
    }

    fn finish(
        self,
        entry: NativeEntry,
        instance: NativeInstance,
        surface: Option<NativeSurface>,
    ) -> Result<GpuContext> {
        let mut requirements = self.requirements;
        if let Some(surface) = &surface {
            requirements = requirements.surface(surface.handle());
        }

        let bring_up = bring_up(&instance, &requirements)?;
        tracing::info!("Selected GPU: {}", bring_up.summary.summary());

        Ok(GpuContext {
            physical_device: bring_up.physical_device,
            summary: bring_up.summary,
            families: bring_up.families,
            graphics_queue: bring_up.graphics_queue,
            compute_queue: bring_up.compute_queue,
            present_queue: bring_up.present_queue,
            device: bring_up.device,
            surface,
            instance,
            entry,
        })
    }
}
