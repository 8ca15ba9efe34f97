//! Synchronization primitives.

use ash::vk;

use crate::device::LogicalDevice;
use crate::driver::DeviceApi;
use crate::error::{GpuError, Result};

/// Create a semaphore.
pub fn create_semaphore<D: DeviceApi>(device: &LogicalDevice<D>) -> Result<vk::Semaphore> {
    device
        .raw()
        .create_semaphore()
        .map_err(|e| GpuError::creation("semaphore", e))
}

/// Destroy a semaphore.
///
/// # Safety
/// The semaphore must have been created on `device`, must not be pending on
/// any queue, and must not be destroyed again.
pub unsafe fn destroy_semaphore<D: DeviceApi>(device: &LogicalDevice<D>, semaphore: vk::Semaphore) {
    unsafe { device.raw().destroy_semaphore(semaphore) };
}

/// Create a fence, optionally already signaled.
pub fn create_fence<D: DeviceApi>(device: &LogicalDevice<D>, signaled: bool) -> Result<vk::Fence> {
    device
        .raw()
        .create_fence(signaled)
        .map_err(|e| GpuError::creation("fence", e))
}

/// Destroy a fence.
///
/// # Safety
/// The fence must have been created on `device`, must not be pending on any
/// queue, and must not be destroyed again.
pub unsafe fn destroy_fence<D: DeviceApi>(device: &LogicalDevice<D>, fence: vk::Fence) {
    unsafe { device.raw().destroy_fence(fence) };
}

/// Wait for all (or any) of `fences`.
///
/// A timeout of zero polls. An elapsed timeout is [`GpuError::Timeout`].
pub fn wait_for_fences<D: DeviceApi>(
    device: &LogicalDevice<D>,
    fences: &[vk::Fence],
    wait_all: bool,
    timeout_ns: u64,
) -> Result<()> {
    if fences.is_empty() {
        return Err(GpuError::InvalidRequest("no fences to wait on".to_string()));
    }

    match device.raw().wait_for_fences(fences, wait_all, timeout_ns) {
        Ok(()) => Ok(()),
        Err(vk::Result::TIMEOUT) => Err(GpuError::Timeout { timeout_ns }),
        Err(e) => Err(GpuError::from(e)),
    }
}

/// Wait for a fence to be signaled.
pub fn wait_for_fence<D: DeviceApi>(
    device: &LogicalDevice<D>,
    fence: vk::Fence,
    timeout_ns: u64,
) -> Result<()> {
    wait_for_fences(device, &[fence], true, timeout_ns)
}

/// Reset fences to the unsignaled state.
pub fn reset_fences<D: DeviceApi>(device: &LogicalDevice<D>, fences: &[vk::Fence]) -> Result<()> {
    device.raw().reset_fences(fences)?;
    Ok(())
}

/// Whether `fence` is currently signaled, without waiting.
pub fn fence_signaled<D: DeviceApi>(device: &LogicalDevice<D>, fence: vk::Fence) -> Result<bool> {
    Ok(device.raw().fence_status(fence)?)
}

/// Frame synchronization resources.
#[derive(Debug)]
pub struct FrameSync {
    /// Signaled when the swapchain image is available.
    pub image_available: vk::Semaphore,
    /// Signaled when rendering is complete.
    pub render_finished: vk::Semaphore,
    /// Signaled when the frame's submission completes. Created signaled.
    pub in_flight: vk::Fence,
}

impl FrameSync {
    pub fn new<D: DeviceApi>(device: &LogicalDevice<D>) -> Result<Self> {
        let image_available = create_semaphore(device)?;
        let render_finished = match create_semaphore(device) {
            Ok(semaphore) => semaphore,
            Err(e) => {
                unsafe { destroy_semaphore(device, image_available) };
                return Err(e);
            }
        };
        let in_flight = match create_fence(device, true) {
            Ok(fence) => fence,
            Err(e) => {
                // SAFETY: both were just created and never submitted.
                unsafe {
                    destroy_semaphore(device, image_available);
                    destroy_semaphore(device, render_finished);
                }
                return Err(e);
            }
        };

        Ok(Self {
            image_available,
            render_finished,
            in_flight,
        })
    }

    /// Wait for this frame's previous submission to finish.
    pub fn wait<D: DeviceApi>(&self, device: &LogicalDevice<D>, timeout_ns: u64) -> Result<()> {
        wait_for_fence(device, self.in_flight, timeout_ns)
    }

    pub fn reset<D: DeviceApi>(&self, device: &LogicalDevice<D>) -> Result<()> {
        reset_fences(device, &[self.in_flight])
    }

    /// Destroy the resources.
    ///
    /// # Safety
    /// The handles must have been created on `device` and none of them may
    /// be in use.
    pub unsafe fn destroy<D: DeviceApi>(self, device: &LogicalDevice<D>) {
        unsafe {
            destroy_semaphore(device, self.image_available);
            destroy_semaphore(device, self.render_finished);
            destroy_fence(device, self.in_flight);
        }
    }
}

/// Manages synchronization for multiple frames in flight.
#[derive(Debug)]
pub struct FrameSyncManager {
    frame_syncs: Vec<FrameSync>,
    current_frame: usize,
}

impl FrameSyncManager {
    pub fn new<D: DeviceApi>(device: &LogicalDevice<D>, frames_in_flight: usize) -> Result<Self> {
        if frames_in_flight == 0 {
            return Err(GpuError::InvalidRequest(
                "at least one frame in flight is required".to_string(),
            ));
        }

        let mut frame_syncs = Vec::with_capacity(frames_in_flight);
        for _ in 0..frames_in_flight {
            match FrameSync::new(device) {
                Ok(sync) => frame_syncs.push(sync),
                Err(e) => {
                    for sync in frame_syncs {
                        // SAFETY: created on `device` above and never submitted.
                        unsafe { sync.destroy(device) };
                    }
                    return Err(e);
                }
            }
        }

        Ok(Self {
            frame_syncs,
            current_frame: 0,
        })
    }

    pub fn current(&self) -> &FrameSync {
        &self.frame_syncs[self.current_frame]
    }

    /// Advance to the next frame.
    pub fn advance(&mut self) {
        self.current_frame = (self.current_frame + 1) % self.frame_syncs.len();
    }

    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    pub fn frames_in_flight(&self) -> usize {
        self.frame_syncs.len()
    }

    /// Destroy all resources. `device` must be the one the manager was
    /// created on, and none of the resources may be in use.
    pub fn destroy<D: DeviceApi>(self, device: &LogicalDevice<D>) {
        for sync in self.frame_syncs {
            // SAFETY: the manager owns its frames, so each is destroyed once.
            unsafe { sync.destroy(device) };
        }
    }
}
