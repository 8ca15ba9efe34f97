//! Vulkan instance creation and physical device selection.

use ash::vk;
use raw_window_handle::RawDisplayHandle;
use std::ffi::{CStr, CString};

use crate::capabilities::{DeviceFeatures, DeviceSummary};
use crate::catalog::{query_device_extensions, query_instance_extensions, query_instance_layers};
use crate::driver::{EntryApi, InstanceApi};
use crate::error::{GpuError, Result};
use crate::queue::{find_presentation_queue_family, find_queue_family};

/// Validation layers to enable in debug builds.
pub fn validation_layers() -> Vec<&'static CStr> {
    vec![c"VK_LAYER_KHRONOS_validation"]
}

/// Parameters for `vkCreateInstance`.
#[derive(Debug, Clone)]
pub struct InstanceRequest {
    pub app_name: CString,
    pub engine_name: CString,
    pub api_version: u32,
    pub extensions: Vec<CString>,
    pub layers: Vec<CString>,
}

impl InstanceRequest {
    /// A Vulkan 1.0 request with no extensions or layers.
    pub fn new(app_name: &str) -> Result<Self> {
        Ok(Self {
            app_name: to_cstring(app_name)?,
            engine_name: c"Nullpointer Engine".to_owned(),
            api_version: vk::API_VERSION_1_0,
            extensions: Vec::new(),
            layers: Vec::new(),
        })
    }

    pub fn with_api_version(mut self, api_version: u32) -> Self {
        self.api_version = api_version;
        self
    }

    /// Add extensions, skipping names already requested.
    pub fn with_extensions<I>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = CString>,
    {
        for extension in extensions {
            if !self.extensions.contains(&extension) {
                self.extensions.push(extension);
            }
        }
        self
    }

    pub fn with_layers<I>(mut self, layers: I) -> Self
    where
        I: IntoIterator<Item = CString>,
    {
        self.layers.extend(layers);
        self
    }
}

pub(crate) fn to_cstring(value: &str) -> Result<CString> {
    CString::new(value)
        .map_err(|_| GpuError::InvalidRequest(format!("{value:?} contains a NUL byte")))
}

/// The surface extensions needed to present to windows on `display`.
pub fn wsi_instance_extensions(display: RawDisplayHandle) -> Result<Vec<CString>> {
    let names = ash_window::enumerate_required_extensions(display)
        .map_err(|e| GpuError::Surface(format!("No surface extensions for display: {e}")))?;

    Ok(names
        .iter()
        // SAFETY: ash-window returns pointers to static NUL-terminated names.
        .map(|&ptr| unsafe { CStr::from_ptr(ptr) }.to_owned())
        .collect())
}

/// Create a Vulkan instance.
///
/// Every requested extension is checked against the instance catalog first;
/// an unsupported one aborts before the instance is created. Requested layers
/// that are not installed are dropped with a warning.
pub fn create_instance<E: EntryApi>(entry: &E, request: &InstanceRequest) -> Result<E::Instance> {
    let available = query_instance_extensions(entry)?;
    for extension in &request.extensions {
        let name = extension.to_string_lossy();
        if !available.is_supported(&name) {
            tracing::error!("Extension \"{name}\" is not supported but needed");
            return Err(GpuError::UnsupportedExtension(name.into_owned()));
        }
    }

    let mut request = request.clone();
    if !request.layers.is_empty() {
        let available_layers = query_instance_layers(entry)?;
        request.layers.retain(|layer| {
            let name = layer.to_string_lossy();
            let found = available_layers.iter().any(|available| *available == name);
            if !found {
                tracing::warn!("Layer {name} not available");
            }
            found
        });
    }

    entry
        .create_instance(&request)
        .map_err(|e| GpuError::creation("instance", e))
}

/// Enumerate physical devices. Zero devices is an error.
pub fn enumerate_devices<I: InstanceApi>(instance: &I) -> Result<Vec<vk::PhysicalDevice>> {
    let devices = instance
        .physical_devices()
        .map_err(|e| GpuError::query("physical devices", e))?;

    if devices.is_empty() {
        tracing::error!("Could not get the number of available physical devices");
        return Err(GpuError::NoDevicesFound);
    }

    Ok(devices)
}

/// What a physical device must offer to be selected.
#[derive(Debug, Clone)]
pub struct DeviceRequirements {
    pub features: DeviceFeatures,
    pub extensions: Vec<String>,
    /// Each entry needs some family whose flags intersect it.
    pub queue_flags: Vec<vk::QueueFlags>,
    /// When set, some family must be able to present to this surface.
    pub surface: Option<vk::SurfaceKHR>,
}

impl Default for DeviceRequirements {
    fn default() -> Self {
        Self {
            features: DeviceFeatures::empty(),
            extensions: Vec::new(),
            queue_flags: vec![vk::QueueFlags::GRAPHICS],
            surface: None,
        }
    }
}

impl DeviceRequirements {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn features(mut self, features: DeviceFeatures) -> Self {
        self.features = features;
        self
    }

    pub fn extension(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !self.extensions.contains(&name) {
            self.extensions.push(name);
        }
        self
    }

    pub fn queue_flags(mut self, flags: vk::QueueFlags) -> Self {
        if !self.queue_flags.contains(&flags) {
            self.queue_flags.push(flags);
        }
        self
    }

    pub fn surface(mut self, surface: vk::SurfaceKHR) -> Self {
        self.surface = Some(surface);
        self
    }
}

/// Pick the first device, in enumeration order, that meets every requirement.
///
/// Devices are not scored; enumeration order is driver-defined.
pub fn select_device<I: InstanceApi>(
    instance: &I,
    devices: &[vk::PhysicalDevice],
    requirements: &DeviceRequirements,
) -> Result<vk::PhysicalDevice> {
    for &device in devices {
        let summary = DeviceSummary::query(instance, device);
        match check_device(instance, device, requirements) {
            Ok(()) => {
                tracing::info!("Chosen device: {}", summary.summary());
                return Ok(device);
            }
            Err(reason) => {
                tracing::debug!("Skipping device \"{}\": {reason}", summary.name);
            }
        }
    }

    Err(GpuError::NotFound(
        "physical device meeting requirements".to_string(),
    ))
}

/// Returns the first failed requirement.
fn check_device<I: InstanceApi>(
    instance: &I,
    device: vk::PhysicalDevice,
    requirements: &DeviceRequirements,
) -> std::result::Result<(), String> {
    let supported = DeviceFeatures::supported_by(&instance.device_features(device));
    let missing = requirements.features.missing_from(supported);
    if !missing.is_empty() {
        return Err(format!("missing features {}", missing.join(", ")));
    }

    if !requirements.extensions.is_empty() {
        let catalog = query_device_extensions(instance, device)
            .map_err(|e| format!("cannot enumerate extensions ({e})"))?;
        if let Some(name) = catalog.first_missing(&requirements.extensions) {
            return Err(format!("missing extension {name}"));
        }
    }

    for &flags in &requirements.queue_flags {
        find_queue_family(instance, device, flags).map_err(|_| format!("no queue with {flags:?}"))?;
    }

    if let Some(surface) = requirements.surface {
        find_presentation_queue_family(instance, device, surface)
            .map_err(|_| "no queue can present to the surface".to_string())?;
    }

    Ok(())
}
