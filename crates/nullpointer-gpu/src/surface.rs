//! Presentation surface queries.
//!
//! Surface capabilities change when the window is resized, so they are
//! queried fresh for every swapchain (re)creation and never cached.

use ash::vk;

use crate::driver::InstanceApi;
use crate::error::{GpuError, Result};
use crate::swapchain::{negotiate, SwapchainConfig, SwapchainDescriptor};

/// Surface capabilities query result.
#[derive(Debug, Clone)]
pub struct SurfaceCapabilities {
    /// Raw surface capabilities.
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported surface formats.
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes.
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceCapabilities {
    /// Query capabilities, formats and present modes of `surface` on a device.
    pub fn query<I: InstanceApi>(
        instance: &I,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> Result<Self> {
        let capabilities = instance
            .surface_capabilities(physical_device, surface)
            .map_err(|e| {
                tracing::error!("Could not get the capabilities of a presentation surface");
                GpuError::query("surface capabilities", e)
            })?;

        let formats = instance
            .surface_formats(physical_device, surface)
            .map_err(|e| GpuError::query("surface formats", e))?;

        let present_modes = instance
            .surface_present_modes(physical_device, surface)
            .map_err(|e| GpuError::query("present modes", e))?;

        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }

    /// Negotiate a swapchain for `surface` from these capabilities.
    pub fn negotiate(
        &self,
        config: &SwapchainConfig,
        surface: vk::SurfaceKHR,
    ) -> Result<SwapchainDescriptor> {
        negotiate(self, config, surface)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeInstance, FakePhysicalDevice};

    #[test]
    fn query_collects_everything() {
        let mut instance = FakeInstance::default();
        let gpu = instance.add_device(FakePhysicalDevice::named("gpu"));
        let surface = instance.surface();

        let caps = SurfaceCapabilities::query(&instance, gpu, surface).unwrap();
        assert_eq!(caps.capabilities.min_image_count, 2);
        assert!(!caps.formats.is_empty());
        assert!(caps.present_modes.contains(&vk::PresentModeKHR::FIFO));
    }

    #[test]
    fn failed_capability_query_is_reported() {
        let mut instance = FakeInstance::default();
        instance.surface_error = Some(vk::Result::ERROR_SURFACE_LOST_KHR);
        let gpu = instance.add_device(FakePhysicalDevice::named("gpu"));
        let surface = instance.surface();

        assert!(matches!(
            SurfaceCapabilities::query(&instance, gpu, surface),
            Err(GpuError::QueryFailed {
                result: Some(vk::Result::ERROR_SURFACE_LOST_KHR),
                ..
            })
        ));
    }
}
