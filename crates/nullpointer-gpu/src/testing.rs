//! In-memory driver for unit tests.
//!
//! Every native call the bring-up code makes is appended to a [`Journal`]
//! shared by an entry, the instances it creates and their devices, so tests
//! can assert on what was called and in which order.

use std::collections::HashMap;
use std::ffi::c_char;
use std::sync::Arc;

use ash::prelude::VkResult;
use ash::vk::{self, Handle};
use parking_lot::Mutex;

use crate::command::Submission;
use crate::device::{create_logical_device, DeviceCreateRequest, LogicalDevice};
use crate::driver::{DeviceApi, EntryApi, InstanceApi};
use crate::instance::InstanceRequest;
use crate::queue::QueueRequest;
use crate::DeviceFeatures;

/// Ordered record of native calls.
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    /// An entry matches when it equals `needle` or continues it after a space.
    fn matches(entry: &str, needle: &str) -> bool {
        entry == needle
            || entry
                .strip_prefix(needle)
                .is_some_and(|rest| rest.starts_with(' '))
    }

    fn position(&self, needle: &str) -> Option<usize> {
        self.0.lock().iter().position(|e| Self::matches(e, needle))
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.position(needle).is_some()
    }

    pub fn count(&self, needle: &str) -> usize {
        self.0
            .lock()
            .iter()
            .filter(|e| Self::matches(e, needle))
            .count()
    }

    /// Both calls happened and the first `a` precedes the first `b`.
    pub fn before(&self, a: &str, b: &str) -> bool {
        match (self.position(a), self.position(b)) {
            (Some(a), Some(b)) => a < b,
            _ => false,
        }
    }
}

fn fill_name<const N: usize>(dst: &mut [c_char; N], name: &str) {
    for (d, b) in dst.iter_mut().take(N - 1).zip(name.bytes()) {
        *d = b as c_char;
    }
}

fn extension(name: &str) -> vk::ExtensionProperties {
    let mut props = vk::ExtensionProperties {
        spec_version: 1,
        ..Default::default()
    };
    fill_name(&mut props.extension_name, name);
    props
}

fn layer(name: &str) -> vk::LayerProperties {
    let mut props = vk::LayerProperties::default();
    fill_name(&mut props.layer_name, name);
    props
}

pub fn family(flags: vk::QueueFlags, queue_count: u32) -> vk::QueueFamilyProperties {
    vk::QueueFamilyProperties {
        queue_flags: flags,
        queue_count,
        ..Default::default()
    }
}

/// Capabilities of a typical desktop surface.
pub fn surface_caps() -> vk::SurfaceCapabilitiesKHR {
    vk::SurfaceCapabilitiesKHR {
        min_image_count: 2,
        max_image_count: 8,
        current_extent: vk::Extent2D {
            width: 800,
            height: 600,
        },
        min_image_extent: vk::Extent2D {
            width: 1,
            height: 1,
        },
        max_image_extent: vk::Extent2D {
            width: 4096,
            height: 4096,
        },
        max_image_array_layers: 1,
        supported_transforms: vk::SurfaceTransformFlagsKHR::IDENTITY,
        current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
        supported_composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
        supported_usage_flags: vk::ImageUsageFlags::COLOR_ATTACHMENT
            | vk::ImageUsageFlags::TRANSFER_DST,
    }
}

/// A fake instance with one swapchain-capable device, and a logical device
/// on its first queue family.
pub fn fake_logical_device() -> (FakeInstance, LogicalDevice<FakeDevice>) {
    let mut instance = FakeInstance::default();
    let mut gpu = FakePhysicalDevice::named("gpu");
    gpu.extensions = vec!["VK_KHR_swapchain"];
    let gpu = instance.add_device(gpu);

    let device = create_logical_device(
        &instance,
        gpu,
        [QueueRequest::single(0)].into_iter().collect(),
        &["VK_KHR_swapchain".to_string()],
        DeviceFeatures::empty(),
    )
    .expect("fake device creation");
    (instance, device)
}

#[derive(Debug)]
pub struct FakeEntry {
    pub extensions: Vec<String>,
    pub layers: Vec<&'static str>,
    pub enumeration_error: Option<vk::Result>,
    pub fail_instance_creation: bool,
    pub journal: Journal,
}

impl FakeEntry {
    pub fn new(extensions: &[&str]) -> Self {
        Self {
            extensions: extensions.iter().map(|e| (*e).to_string()).collect(),
            layers: Vec::new(),
            enumeration_error: None,
            fail_instance_creation: false,
            journal: Journal::default(),
        }
    }
}

impl EntryApi for FakeEntry {
    type Instance = FakeInstance;

    fn instance_extensions(&self) -> VkResult<Vec<vk::ExtensionProperties>> {
        if let Some(e) = self.enumeration_error {
            return Err(e);
        }
        Ok(self.extensions.iter().map(|e| extension(e)).collect())
    }

    fn instance_layers(&self) -> VkResult<Vec<vk::LayerProperties>> {
        Ok(self.layers.iter().map(|l| layer(l)).collect())
    }

    fn create_instance(&self, request: &InstanceRequest) -> VkResult<FakeInstance> {
        self.journal.push("create_instance");
        if self.fail_instance_creation {
            return Err(vk::Result::ERROR_INITIALIZATION_FAILED);
        }
        Ok(FakeInstance {
            journal: self.journal.clone(),
            enabled_layers: request
                .layers
                .iter()
                .map(|l| l.to_string_lossy().into_owned())
                .collect(),
            ..FakeInstance::default()
        })
    }
}

#[derive(Debug, Clone)]
pub struct FakePhysicalDevice {
    pub name: String,
    pub vendor_id: u32,
    pub extensions: Vec<&'static str>,
    pub features: vk::PhysicalDeviceFeatures,
    pub families: Vec<vk::QueueFamilyProperties>,
    /// Presentation support per family; missing entries mean unsupported.
    pub present_support: Vec<bool>,
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl FakePhysicalDevice {
    /// A device with one all-purpose queue family that can present, and no
    /// extensions.
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            vendor_id: 0x10DE,
            extensions: Vec::new(),
            features: vk::PhysicalDeviceFeatures::default(),
            families: vec![family(
                vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER,
                1,
            )],
            present_support: vec![true],
            capabilities: surface_caps(),
            formats: vec![
                vk::SurfaceFormatKHR {
                    format: vk::Format::B8G8R8A8_UNORM,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                },
                vk::SurfaceFormatKHR {
                    format: vk::Format::R8G8B8A8_UNORM,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                },
            ],
            present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
        }
    }
}

#[derive(Debug, Default)]
pub struct FakeInstance {
    pub journal: Journal,
    pub devices: Vec<FakePhysicalDevice>,
    pub enabled_layers: Vec<String>,
    pub fail_device_creation: bool,
    pub surface_error: Option<vk::Result>,
}

impl FakeInstance {
    pub fn add_device(&mut self, device: FakePhysicalDevice) -> vk::PhysicalDevice {
        self.devices.push(device);
        vk::PhysicalDevice::from_raw(self.devices.len() as u64)
    }

    pub fn surface(&self) -> vk::SurfaceKHR {
        vk::SurfaceKHR::from_raw(0x5ACE)
    }

    fn physical(&self, handle: vk::PhysicalDevice) -> &FakePhysicalDevice {
        &self.devices[handle.as_raw() as usize - 1]
    }
}

impl InstanceApi for FakeInstance {
    type Device = FakeDevice;

    fn physical_devices(&self) -> VkResult<Vec<vk::PhysicalDevice>> {
        Ok((1..=self.devices.len() as u64)
            .map(vk::PhysicalDevice::from_raw)
            .collect())
    }

    fn device_extensions(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> VkResult<Vec<vk::ExtensionProperties>> {
        Ok(self
            .physical(physical_device)
            .extensions
            .iter()
            .map(|e| extension(e))
            .collect())
    }

    fn device_features(&self, physical_device: vk::PhysicalDevice) -> vk::PhysicalDeviceFeatures {
        self.physical(physical_device).features
    }

    fn device_properties(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> vk::PhysicalDeviceProperties {
        let device = self.physical(physical_device);
        let mut properties = vk::PhysicalDeviceProperties {
            api_version: vk::API_VERSION_1_0,
            vendor_id: device.vendor_id,
            device_type: vk::PhysicalDeviceType::DISCRETE_GPU,
            ..Default::default()
        };
        fill_name(&mut properties.device_name, &device.name);
        properties
    }

    fn queue_family_properties(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> Vec<vk::QueueFamilyProperties> {
        self.physical(physical_device).families.clone()
    }

    fn surface_support(
        &self,
        physical_device: vk::PhysicalDevice,
        queue_family: u32,
        _surface: vk::SurfaceKHR,
    ) -> VkResult<bool> {
        Ok(self
            .physical(physical_device)
            .present_support
            .get(queue_family as usize)
            .copied()
            .unwrap_or(false))
    }

    fn surface_capabilities(
        &self,
        physical_device: vk::PhysicalDevice,
        _surface: vk::SurfaceKHR,
    ) -> VkResult<vk::SurfaceCapabilitiesKHR> {
        match self.surface_error {
            Some(e) => Err(e),
            None => Ok(self.physical(physical_device).capabilities),
        }
    }

    fn surface_formats(
        &self,
        physical_device: vk::PhysicalDevice,
        _surface: vk::SurfaceKHR,
    ) -> VkResult<Vec<vk::SurfaceFormatKHR>> {
        Ok(self.physical(physical_device).formats.clone())
    }

    fn surface_present_modes(
        &self,
        physical_device: vk::PhysicalDevice,
        _surface: vk::SurfaceKHR,
    ) -> VkResult<Vec<vk::PresentModeKHR>> {
        Ok(self.physical(physical_device).present_modes.clone())
    }

    fn create_device(
        &self,
        _physical_device: vk::PhysicalDevice,
        request: &DeviceCreateRequest<'_>,
    ) -> VkResult<FakeDevice> {
        self.journal.push("create_device");
        if self.fail_device_creation {
            return Err(vk::Result::ERROR_INITIALIZATION_FAILED);
        }
        Ok(FakeDevice {
            queue_families: request.queues.iter().map(|q| q.family_index).collect(),
            features: request.features,
            extensions: request
                .extensions
                .iter()
                .map(|e| e.to_string_lossy().into_owned())
                .collect(),
            journal: self.journal.clone(),
            state: Mutex::new(DeviceState::default()),
        })
    }
}

/// A queue submission as the fake received it.
#[derive(Debug, Clone)]
pub struct RecordedSubmission {
    pub queue: vk::Queue,
    pub wait_semaphores: Vec<vk::Semaphore>,
    pub wait_stages: Vec<vk::PipelineStageFlags>,
    pub command_buffers: Vec<vk::CommandBuffer>,
    pub signal_semaphores: Vec<vk::Semaphore>,
    pub fence: vk::Fence,
}

#[derive(Debug)]
struct DeviceState {
    next_handle: u64,
    fences: HashMap<vk::Fence, bool>,
    fail_swapchain_creation: bool,
    swapchain_images: VkResult<u32>,
    fail_sync_creation: bool,
    acquire_result: VkResult<(u32, bool)>,
    submissions: Vec<RecordedSubmission>,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            next_handle: 1,
            fences: HashMap::new(),
            fail_swapchain_creation: false,
            swapchain_images: Ok(3),
            fail_sync_creation: false,
            acquire_result: Ok((0, false)),
            submissions: Vec::new(),
        }
    }
}

impl DeviceState {
    fn next<H: Handle>(&mut self) -> H {
        let raw = self.next_handle;
        self.next_handle += 1;
        H::from_raw(raw)
    }
}

#[derive(Debug)]
pub struct FakeDevice {
    pub queue_families: Vec<u32>,
    pub features: vk::PhysicalDeviceFeatures,
    pub extensions: Vec<String>,
    journal: Journal,
    state: Mutex<DeviceState>,
}

impl FakeDevice {
    pub fn fail_swapchain_creation(&self, fail: bool) {
        self.state.lock().fail_swapchain_creation = fail;
    }

    pub fn set_swapchain_image_count(&self, count: u32) {
        self.state.lock().swapchain_images = Ok(count);
    }

    pub fn set_swapchain_images_error(&self, error: vk::Result) {
        self.state.lock().swapchain_images = Err(error);
    }

    pub fn fail_sync_creation(&self, fail: bool) {
        self.state.lock().fail_sync_creation = fail;
    }

    pub fn set_acquire_result(&self, result: VkResult<(u32, bool)>) {
        self.state.lock().acquire_result = result;
    }

    pub fn submissions(&self) -> Vec<RecordedSubmission> {
        self.state.lock().submissions.clone()
    }
}

impl DeviceApi for FakeDevice {
    fn queue(&self, family_index: u32, queue_index: u32) -> vk::Queue {
        vk::Queue::from_raw(0x1000 + (u64::from(family_index) << 8) + u64::from(queue_index))
    }

    fn wait_idle(&self) -> VkResult<()> {
        self.journal.push("wait_idle");
        Ok(())
    }

    unsafe fn destroy(&mut self) {
        self.journal.push("destroy_device");
    }

    fn create_swapchain(
        &self,
        _descriptor: &crate::SwapchainDescriptor,
        old_swapchain: vk::SwapchainKHR,
    ) -> VkResult<vk::SwapchainKHR> {
        self.journal
            .push(format!("create_swapchain old={}", old_swapchain.as_raw()));
        let mut state = self.state.lock();
        if state.fail_swapchain_creation {
            return Err(vk::Result::ERROR_NATIVE_WINDOW_IN_USE_KHR);
        }
        Ok(state.next())
    }

    unsafe fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        self.journal
            .push(format!("destroy_swapchain {}", swapchain.as_raw()));
    }

    fn swapchain_images(&self, _swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
        let mut state = self.state.lock();
        let count = state.swapchain_images?;
        Ok((0..count).map(|_| state.next()).collect())
    }

    fn acquire_next_image(
        &self,
        _swapchain: vk::SwapchainKHR,
        _timeout_ns: u64,
        _semaphore: vk::Semaphore,
        _fence: vk::Fence,
    ) -> VkResult<(u32, bool)> {
        self.state.lock().acquire_result
    }

    fn queue_present(
        &self,
        _queue: vk::Queue,
        _wait_semaphores: &[vk::Semaphore],
        swapchains: &[vk::SwapchainKHR],
        _image_indices: &[u32],
    ) -> VkResult<bool> {
        self.journal
            .push(format!("queue_present targets={}", swapchains.len()));
        Ok(false)
    }

    fn queue_submit(
        &self,
        queue: vk::Queue,
        submission: &Submission<'_>,
        fence: vk::Fence,
    ) -> VkResult<()> {
        self.journal.push("queue_submit");
        let mut state = self.state.lock();
        state.submissions.push(RecordedSubmission {
            queue,
            wait_semaphores: submission.wait_semaphores.clone(),
            wait_stages: submission.wait_stages.clone(),
            command_buffers: submission.command_buffers.to_vec(),
            signal_semaphores: submission.signal_semaphores.to_vec(),
            fence,
        });
        if fence != vk::Fence::null() {
            state.fences.insert(fence, true);
        }
        Ok(())
    }

    fn create_semaphore(&self) -> VkResult<vk::Semaphore> {
        let mut state = self.state.lock();
        if state.fail_sync_creation {
            return Err(vk::Result::ERROR_OUT_OF_HOST_MEMORY);
        }
        Ok(state.next())
    }

    unsafe fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        self.journal
            .push(format!("destroy_semaphore {}", semaphore.as_raw()));
    }

    fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence> {
        let mut state = self.state.lock();
        if state.fail_sync_creation {
            return Err(vk::Result::ERROR_OUT_OF_HOST_MEMORY);
        }
        let fence = state.next();
        state.fences.insert(fence, signaled);
        Ok(fence)
    }

    unsafe fn destroy_fence(&self, fence: vk::Fence) {
        self.journal.push(format!("destroy_fence {}", fence.as_raw()));
        self.state.lock().fences.remove(&fence);
    }

    fn fence_status(&self, fence: vk::Fence) -> VkResult<bool> {
        self.state
            .lock()
            .fences
            .get(&fence)
            .copied()
            .ok_or(vk::Result::ERROR_DEVICE_LOST)
    }

    fn wait_for_fences(
        &self,
        fences: &[vk::Fence],
        wait_all: bool,
        _timeout_ns: u64,
    ) -> VkResult<()> {
        let state = self.state.lock();
        let signaled = |fence: &vk::Fence| state.fences.get(fence).copied().unwrap_or(false);
        let done = if wait_all {
            fences.iter().all(signaled)
        } else {
            fences.iter().any(signaled)
        };
        if done {
            Ok(())
        } else {
            Err(vk::Result::TIMEOUT)
        }
    }

    fn reset_fences(&self, fences: &[vk::Fence]) -> VkResult<()> {
        let mut state = self.state.lock();
        for fence in fences {
            state.fences.insert(*fence, false);
        }
        Ok(())
    }
}
