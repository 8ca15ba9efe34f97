//! Swapchain negotiation and management.
//!
//! Negotiation is linear: image count, extent, usage, transform, composite
//! alpha, format and present mode are each derived from a fresh
//! [`SurfaceCapabilities`] snapshot and the caller's [`SwapchainConfig`].

use ash::vk;

use crate::device::LogicalDevice;
use crate::driver::DeviceApi;
use crate::error::{GpuError, Result};
use crate::surface::SurfaceCapabilities;

/// Width/height sentinel meaning "the swapchain decides the extent".
const UNDEFINED_EXTENT: u32 = u32::MAX;

/// What the caller would like the swapchain to look like.
#[derive(Debug, Clone, Copy)]
pub struct SwapchainConfig {
    pub format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub usage: vk::ImageUsageFlags,
    pub transform: vk::SurfaceTransformFlagsKHR,
    /// Used when the surface lets the swapchain pick its size.
    pub fallback_extent: vk::Extent2D,
}

impl Default for SwapchainConfig {
    fn default() -> Self {
        Self {
            format: vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            present_mode: vk::PresentModeKHR::MAILBOX,
            usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            fallback_extent: vk::Extent2D {
                width: 640,
                height: 480,
            },
        }
    }
}

impl SwapchainConfig {
    pub fn with_format(mut self, format: vk::Format, color_space: vk::ColorSpaceKHR) -> Self {
        self.format = vk::SurfaceFormatKHR {
            format,
            color_space,
        };
        self
    }

    pub fn with_present_mode(mut self, present_mode: vk::PresentModeKHR) -> Self {
        self.present_mode = present_mode;
        self
    }

    pub fn with_usage(mut self, usage: vk::ImageUsageFlags) -> Self {
        self.usage = usage;
        self
    }

    pub fn with_transform(mut self, transform: vk::SurfaceTransformFlagsKHR) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_fallback_extent(mut self, width: u32, height: u32) -> Self {
        self.fallback_extent = vk::Extent2D { width, height };
        self
    }
}

/// A fully negotiated swapchain configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainDescriptor {
    pub surface: vk::SurfaceKHR,
    pub format: vk::Format,
    pub color_space: vk::ColorSpaceKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
    pub usage: vk::ImageUsageFlags,
    pub transform: vk::SurfaceTransformFlagsKHR,
    pub composite_alpha: vk::CompositeAlphaFlagsKHR,
    pub present_mode: vk::PresentModeKHR,
}

/// One more image than the minimum, capped at the maximum when there is one.
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = capabilities.min_image_count.saturating_add(1);
    if capabilities.max_image_count > 0 {
        count.min(capabilities.max_image_count)
    } else {
        count
    }
}

/// Calculate swapchain extent.
pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    fallback: vk::Extent2D,
) -> vk::Extent2D {
    if capabilities.current_extent.width == UNDEFINED_EXTENT {
        vk::Extent2D {
            width: fallback.width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: fallback.height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        }
    } else {
        capabilities.current_extent
    }
}

/// Every desired usage must be supported; there is no silent downgrade.
pub fn negotiate_usage(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    desired: vk::ImageUsageFlags,
) -> Result<vk::ImageUsageFlags> {
    let usage = desired & capabilities.supported_usage_flags;
    if usage != desired {
        return Err(GpuError::UnsupportedUsage {
            desired,
            supported: capabilities.supported_usage_flags,
        });
    }
    Ok(usage)
}

/// The desired transform if it is set and supported, else the surface's
/// current one.
pub fn negotiate_transform(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    desired: vk::SurfaceTransformFlagsKHR,
) -> vk::SurfaceTransformFlagsKHR {
    if !desired.is_empty() && capabilities.supported_transforms.contains(desired) {
        desired
    } else {
        tracing::debug!(
            "Transform {desired:?} not supported, using current {:?}",
            capabilities.current_transform
        );
        capabilities.current_transform
    }
}

/// `OPAQUE` if supported, otherwise the lowest supported mode.
pub fn negotiate_composite_alpha(
    capabilities: &vk::SurfaceCapabilitiesKHR,
) -> vk::CompositeAlphaFlagsKHR {
    let supported = capabilities.supported_composite_alpha;
    [
        vk::CompositeAlphaFlagsKHR::OPAQUE,
        vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED,
        vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED,
        vk::CompositeAlphaFlagsKHR::INHERIT,
    ]
    .into_iter()
    .find(|&mode| supported.contains(mode))
    .unwrap_or(vk::CompositeAlphaFlagsKHR::OPAQUE)
}

/// Pick a surface format, in order of preference:
///
/// 1. a single `UNDEFINED` entry means anything goes, so the desired pair;
/// 2. an exact format and colour space match;
/// 3. a format match with the surface's colour space;
/// 4. the first reported pair.
pub fn negotiate_format(
    available: &[vk::SurfaceFormatKHR],
    desired: vk::SurfaceFormatKHR,
) -> Result<vk::SurfaceFormatKHR> {
    let Some(&first) = available.first() else {
        tracing::error!("Could not enumerate supported surface formats");
        return Err(GpuError::empty("surface formats"));
    };

    if available.len() == 1 && first.format == vk::Format::UNDEFINED {
        return Ok(desired);
    }

    if available.contains(&desired) {
        return Ok(desired);
    }

    if let Some(same_format) = available.iter().find(|f| f.format == desired.format) {
        tracing::warn!(
            "{:?} with {:?} not supported, falling back on {:?}",
            desired.format,
            desired.color_space,
            same_format.color_space
        );
        return Ok(*same_format);
    }

    tracing::warn!(
        "{:?} not supported, using {:?} with {:?}",
        desired.format,
        first.format,
        first.color_space
    );
    Ok(first)
}

/// The desired present mode, else FIFO.
pub fn select_present_mode(
    available: &[vk::PresentModeKHR],
    desired: vk::PresentModeKHR,
) -> Result<vk::PresentModeKHR> {
    if available.is_empty() {
        tracing::error!("Could not enumerate present modes");
        return Err(GpuError::empty("present modes"));
    }

    if available.contains(&desired) {
        return Ok(desired);
    }

    if available.contains(&vk::PresentModeKHR::FIFO) {
        tracing::warn!("Present mode {desired:?} not supported, falling back on FIFO");
        return Ok(vk::PresentModeKHR::FIFO);
    }

    Err(GpuError::NotFound(format!(
        "present mode {desired:?} or FIFO"
    )))
}

/// Run the full negotiation for `surface`.
pub fn negotiate(
    caps: &SurfaceCapabilities,
    config: &SwapchainConfig,
    surface: vk::SurfaceKHR,
) -> Result<SwapchainDescriptor> {
    let capabilities = &caps.capabilities;

    let image_count = choose_image_count(capabilities);
    let extent = choose_extent(capabilities, config.fallback_extent);
    let usage = negotiate_usage(capabilities, config.usage)?;
    let transform = negotiate_transform(capabilities, config.transform);
    let composite_alpha = negotiate_composite_alpha(capabilities);
    let format = negotiate_format(&caps.formats, config.format)?;
    let present_mode = select_present_mode(&caps.present_modes, config.present_mode)?;

    Ok(SwapchainDescriptor {
        surface,
        format: format.format,
        color_space: format.color_space,
        extent,
        image_count,
        usage,
        transform,
        composite_alpha,
        present_mode,
    })
}

/// Swapchain wrapper.
///
/// The images belong to the swapchain and are released with it.
#[derive(Debug)]
pub struct Swapchain {
    handle: vk::SwapchainKHR,
    descriptor: SwapchainDescriptor,
    images: Vec<vk::Image>,
}

impl Swapchain {
    /// Create a new swapchain and fetch its images.
    ///
    /// If the images cannot be fetched the swapchain is not destroyed; the
    /// error carries its handle.
    pub fn create<D: DeviceApi>(
        device: &LogicalDevice<D>,
        descriptor: SwapchainDescriptor,
    ) -> Result<Self> {
        let handle = build(device.raw(), &descriptor, vk::SwapchainKHR::null())?;
        let images = fetch_images(device.raw(), handle)?;

        tracing::info!(
            "Created swapchain {}x{} ({} images, {:?}, {:?})",
            descriptor.extent.width,
            descriptor.extent.height,
            images.len(),
            descriptor.format,
            descriptor.present_mode
        );

        Ok(Self {
            handle,
            descriptor,
            images,
        })
    }

    /// Replace this swapchain with one built from `descriptor`.
    ///
    /// The current swapchain is handed to the driver as the old swapchain and
    /// destroyed only once the new one exists. If creation fails, `self` is
    /// left untouched. If the new images cannot be fetched, `self` already
    /// holds the new swapchain with no images.
    pub fn recreate<D: DeviceApi>(
        &mut self,
        device: &LogicalDevice<D>,
        descriptor: SwapchainDescriptor,
    ) -> Result<()> {
        let handle = build(device.raw(), &descriptor, self.handle)?;

        // SAFETY: `self.handle` was created on `device` and is replaced below.
        unsafe { device.raw().destroy_swapchain(self.handle) };
        self.handle = handle;
        self.descriptor = descriptor;
        self.images.clear();

        self.images = fetch_images(device.raw(), handle)?;
        tracing::info!(
            "Recreated swapchain {}x{} ({} images)",
            descriptor.extent.width,
            descriptor.extent.height,
            self.images.len()
        );
        Ok(())
    }

    /// Retry fetching the images after a [`GpuError::SwapchainImagesUnavailable`].
    pub fn refresh_images<D: DeviceApi>(&mut self, device: &LogicalDevice<D>) -> Result<()> {
        self.images = fetch_images(device.raw(), self.handle)?;
        Ok(())
    }

    pub fn handle(&self) -> vk::SwapchainKHR {
        self.handle
    }

    pub fn descriptor(&self) -> &SwapchainDescriptor {
        &self.descriptor
    }

    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.descriptor.extent
    }

    pub fn format(&self) -> vk::Format {
        self.descriptor.format
    }

    /// Acquire the next image.
    pub fn acquire_next_image<D: DeviceApi>(
        &self,
        device: &LogicalDevice<D>,
        semaphore: vk::Semaphore,
        fence: vk::Fence,
        timeout_ns: u64,
    ) -> Result<AcquiredImage> {
        acquire_next_image(device, self, semaphore, fence, timeout_ns)
    }

    /// Destroy the swapchain.
    ///
    /// The swapchain must not be in use.
    pub fn destroy<D: DeviceApi>(self, device: &LogicalDevice<D>) {
        // SAFETY: `self` is consumed, so the handle is destroyed once.
        unsafe { device.raw().destroy_swapchain(self.handle) };
    }
}

fn build<D: DeviceApi>(
    device: &D,
    descriptor: &SwapchainDescriptor,
    old_swapchain: vk::SwapchainKHR,
) -> Result<vk::SwapchainKHR> {
    device
        .create_swapchain(descriptor, old_swapchain)
        .map_err(|e| {
            tracing::error!("Could not create swapchain: {e}");
            GpuError::creation("swapchain", e)
        })
}

fn fetch_images<D: DeviceApi>(device: &D, swapchain: vk::SwapchainKHR) -> Result<Vec<vk::Image>> {
    match device.swapchain_images(swapchain) {
        Ok(images) if !images.is_empty() => Ok(images),
        Ok(_) => Err(GpuError::SwapchainImagesUnavailable {
            swapchain,
            result: None,
        }),
        Err(e) => Err(GpuError::SwapchainImagesUnavailable {
            swapchain,
            result: Some(e),
        }),
    }
}

/// An acquired swapchain image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquiredImage {
    pub index: u32,
    /// The image is usable but the swapchain should be rebuilt soon.
    pub suboptimal: bool,
}

/// Acquire the next presentable image.
///
/// A suboptimal swapchain still yields an image. An elapsed timeout is
/// [`GpuError::Timeout`]; an out-of-date swapchain is [`GpuError::OutOfDate`].
pub fn acquire_next_image<D: DeviceApi>(
    device: &LogicalDevice<D>,
    swapchain: &Swapchain,
    semaphore: vk::Semaphore,
    fence: vk::Fence,
    timeout_ns: u64,
) -> Result<AcquiredImage> {
    if semaphore == vk::Semaphore::null() && fence == vk::Fence::null() {
        return Err(GpuError::InvalidRequest(
            "acquire needs a semaphore or a fence to signal".to_string(),
        ));
    }

    match device
        .raw()
        .acquire_next_image(swapchain.handle, timeout_ns, semaphore, fence)
    {
        Ok((index, suboptimal)) => {
            if suboptimal {
                tracing::debug!("Acquired image {index} from a suboptimal swapchain");
            }
            Ok(AcquiredImage { index, suboptimal })
        }
        Err(vk::Result::TIMEOUT | vk::Result::NOT_READY) => Err(GpuError::Timeout { timeout_ns }),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Err(GpuError::OutOfDate),
        Err(e) => Err(GpuError::from(e)),
    }
}

/// Present images from one or more swapchains behind one set of wait semaphores.
///
/// Returns whether any swapchain is suboptimal.
pub fn present<D: DeviceApi>(
    device: &LogicalDevice<D>,
    queue: vk::Queue,
    wait_semaphores: &[vk::Semaphore],
    targets: &[(&Swapchain, u32)],
) -> Result<bool> {
    if targets.is_empty() {
        return Err(GpuError::InvalidRequest("nothing to present".to_string()));
    }

    let (swapchains, image_indices): (Vec<_>, Vec<_>) = targets
        .iter()
        .map(|(swapchain, index)| (swapchain.handle, *index))
        .unzip();

    match device
        .raw()
        .queue_present(queue, wait_semaphores, &swapchains, &image_indices)
    {
        Ok(suboptimal) => Ok(suboptimal),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Err(GpuError::OutOfDate),
        Err(e) => Err(GpuError::from(e)),
    }
}
