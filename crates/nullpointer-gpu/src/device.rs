//! Logical device creation.

use ash::vk;
use std::ffi::CString;

use crate::capabilities::DeviceFeatures;
use crate::catalog::{name_of, query_device_extensions};
use crate::driver::{DeviceApi, InstanceApi};
use crate::error::{GpuError, Result};
use crate::instance::to_cstring;
use crate::queue::{QueueRequest, QueueRequests};

/// Validated parameters for `vkCreateDevice`.
#[derive(Debug)]
pub struct DeviceCreateRequest<'a> {
    /// One entry per distinct queue family.
    pub queues: &'a [QueueRequest],
    pub extensions: &'a [CString],
    pub features: vk::PhysicalDeviceFeatures,
}

/// A logical device and the queue families it was created with.
///
/// Swapchains, semaphores and fences created from this device must be
/// destroyed before it is dropped. Dropping waits for the device to go idle
/// and destroys it.
pub struct LogicalDevice<D: DeviceApi> {
    device: D,
    physical_device: vk::PhysicalDevice,
    queue_requests: QueueRequests,
    extensions: Vec<String>,
    features: DeviceFeatures,
}

impl<D: DeviceApi> LogicalDevice<D> {
    /// Get the driver device.
    pub fn raw(&self) -> &D {
        &self.device
    }

    /// Get the physical device handle.
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// The queue requests the device was created with.
    pub fn queue_requests(&self) -> &QueueRequests {
        &self.queue_requests
    }

    /// The enabled device extensions.
    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    /// The enabled device features.
    pub fn features(&self) -> DeviceFeatures {
        self.features
    }

    /// Get a queue handle.
    pub fn queue(&self, family_index: u32, queue_index: u32) -> vk::Queue {
        debug_assert!(
            self.queue_requests
                .get(family_index)
                .is_some_and(|request| queue_index < request.queue_count()),
            "queue {queue_index} of family {family_index} was not requested"
        );
        self.device.queue(family_index, queue_index)
    }

    /// Wait for device to be idle.
    pub fn wait_idle(&self) -> Result<()> {
        self.device.wait_idle()?;
        Ok(())
    }
}

impl<D: DeviceApi> Drop for LogicalDevice<D> {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            tracing::warn!("Device wait idle failed during teardown: {e}");
        }
        // SAFETY: the device is owned here and this is the only call.
        unsafe { self.device.destroy() };
    }
}

impl<D: DeviceApi> std::fmt::Debug for LogicalDevice<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogicalDevice")
            .field("physical_device", &self.physical_device)
            .field("queue_requests", &self.queue_requests)
            .field("extensions", &self.extensions)
            .field("features", &self.features)
            .finish_non_exhaustive()
    }
}

/// Create a logical device.
///
/// Every desired extension is checked against the device's catalog before
/// anything is allocated. On failure no device is returned.
pub fn create_logical_device<I: InstanceApi>(
    instance: &I,
    physical_device: vk::PhysicalDevice,
    queue_requests: QueueRequests,
    desired_extensions: &[String],
    desired_features: DeviceFeatures,
) -> Result<LogicalDevice<I::Device>> {
    if queue_requests.is_empty() {
        return Err(GpuError::InvalidRequest("no queues requested".to_string()));
    }
    for request in queue_requests.as_slice() {
        request.validate()?;
    }

    let catalog = query_device_extensions(instance, physical_device)?;
    if let Some(name) = catalog.first_missing(desired_extensions) {
        tracing::error!("Extension \"{name}\" is not supported by the physical device");
        return Err(GpuError::UnsupportedExtension(name.to_string()));
    }

    let extension_names = desired_extensions
        .iter()
        .map(|name| to_cstring(name))
        .collect::<Result<Vec<_>>>()?;

    let request = DeviceCreateRequest {
        queues: queue_requests.as_slice(),
        extensions: &extension_names,
        features: desired_features.to_vk(),
    };

    let device = instance
        .create_device(physical_device, &request)
        .map_err(|e| {
            tracing::error!("Could not create logical device: {e}");
            GpuError::DeviceCreationFailed(e)
        })?;

    catalog.log_available();
    tracing::debug!(
        "Created logical device with {} queue families and extensions {:?}",
        queue_requests.len(),
        desired_extensions
    );

    Ok(LogicalDevice {
        device,
        physical_device,
        queue_requests,
        extensions: desired_extensions.to_vec(),
        features: desired_features,
    })
}

/// Create a logical device with `VK_KHR_swapchain` enabled in addition to
/// `extra_extensions`.
pub fn create_logical_device_with_wsi<I: InstanceApi>(
    instance: &I,
    physical_device: vk::PhysicalDevice,
    queue_requests: QueueRequests,
    extra_extensions: &[String],
    desired_features: DeviceFeatures,
) -> Result<LogicalDevice<I::Device>> {
    let swapchain = name_of(ash::khr::swapchain::NAME);
    let mut extensions = extra_extensions.to_vec();
    if !extensions.contains(&swapchain) {
        extensions.push(swapchain);
    }

    create_logical_device(
        instance,
        physical_device,
        queue_requests,
        &extensions,
        desired_features,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::QueueRequest;
    use crate::testing::{FakeInstance, FakePhysicalDevice};

    fn setup() -> (FakeInstance, vk::PhysicalDevice) {
        let mut instance = FakeInstance::default();
        let mut gpu = FakePhysicalDevice::named("gpu");
        gpu.extensions = vec!["VK_KHR_swapchain", "VK_KHR_maintenance1"];
        let handle = instance.add_device(gpu);
        (instance, handle)
    }

    fn requests(families: &[u32]) -> QueueRequests {
        families.iter().map(|&f| QueueRequest::single(f)).collect()
    }

    #[test]
    fn unsupported_extension_aborts_before_creation() {
        let (instance, gpu) = setup();
        let result = create_logical_device(
            &instance,
            gpu,
            requests(&[0]),
            &["VK_KHR_swapchain".to_string(), "VK_EXT_missing".to_string()],
            DeviceFeatures::empty(),
        );

        assert!(matches!(result, Err(GpuError::UnsupportedExtension(ref n)) if n == "VK_EXT_missing"));
        assert!(!instance.journal.contains("create_device"));
    }

    #[test]
    fn one_queue_record_per_family() {
        let (instance, gpu) = setup();
        let device = create_logical_device(
            &instance,
            gpu,
            requests(&[0, 0, 0]),
            &[],
            DeviceFeatures::GEOMETRY_SHADER,
        )
        .unwrap();

        assert_eq!(device.raw().queue_families, vec![0]);
        assert_eq!(device.features(), DeviceFeatures::GEOMETRY_SHADER);
        assert_eq!(device.raw().features.geometry_shader, vk::TRUE);
    }

    #[test]
    fn creation_failure_returns_no_device() {
        let (mut instance, gpu) = setup();
        instance.fail_device_creation = true;
        let result = create_logical_device(&instance, gpu, requests(&[0]), &[], DeviceFeatures::empty());
        assert!(matches!(
            result,
            Err(GpuError::DeviceCreationFailed(vk::Result::ERROR_INITIALIZATION_FAILED))
        ));
        assert!(instance.journal.contains("create_device"));
        assert!(!instance.journal.contains("destroy_device"));
    }

    #[test]
    fn wsi_variant_enables_swapchain_once() {
        let (instance, gpu) = setup();
        let device = create_logical_device_with_wsi(
            &instance,
            gpu,
            requests(&[0]),
            &["VK_KHR_swapchain".to_string(), "VK_KHR_maintenance1".to_string()],
            DeviceFeatures::empty(),
        )
        .unwrap();

        assert_eq!(
            device.extensions(),
            &["VK_KHR_swapchain".to_string(), "VK_KHR_maintenance1".to_string()]
        );
        assert_eq!(device.raw().extensions.len(), 2);
    }

    #[test]
    fn drop_destroys_device_once() {
        let (instance, gpu) = setup();
        let device =
            create_logical_device(&instance, gpu, requests(&[0]), &[], DeviceFeatures::empty())
                .unwrap();
        let _queue = device.queue(0, 0);
        drop(device);

        assert_eq!(instance.journal.count("destroy_device"), 1);
        assert!(instance.journal.before("wait_idle", "destroy_device"));
    }

    #[test]
    fn empty_request_set_is_rejected() {
        let (instance, gpu) = setup();
        let result = create_logical_device(&instance, gpu, QueueRequests::new(), &[], DeviceFeatures::empty());
        assert!(matches!(result, Err(GpuError::InvalidRequest(_))));
    }
}
