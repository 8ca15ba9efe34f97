//! Queue submission.

use ash::vk;

use crate::device::LogicalDevice;
use crate::driver::DeviceApi;
use crate::error::Result;

/// One submission batch, ready for the driver.
///
/// `wait_semaphores` and `wait_stages` always have the same length.
#[derive(Debug, Clone, Default)]
pub struct Submission<'a> {
    pub wait_semaphores: Vec<vk::Semaphore>,
    pub wait_stages: Vec<vk::PipelineStageFlags>,
    pub command_buffers: &'a [vk::CommandBuffer],
    pub signal_semaphores: &'a [vk::Semaphore],
}

impl<'a> Submission<'a> {
    pub fn new(
        waits: &[(vk::Semaphore, vk::PipelineStageFlags)],
        command_buffers: &'a [vk::CommandBuffer],
        signal_semaphores: &'a [vk::Semaphore],
    ) -> Self {
        let (wait_semaphores, wait_stages) = waits.iter().copied().unzip();
        Self {
            wait_semaphores,
            wait_stages,
            command_buffers,
            signal_semaphores,
        }
    }
}

/// Submit one batch to `queue`.
///
/// Each wait semaphore is paired with the stage mask it blocks. `fence`, if not
/// null, is signaled when the batch completes. Calls on the same queue must be
/// serialized by the caller.
pub fn submit<D: DeviceApi>(
    device: &LogicalDevice<D>,
    queue: vk::Queue,
    waits: &[(vk::Semaphore, vk::PipelineStageFlags)],
    command_buffers: &[vk::CommandBuffer],
    signal_semaphores: &[vk::Semaphore],
    fence: vk::Fence,
) -> Result<()> {
    let submission = Submission::new(waits, command_buffers, signal_semaphores);
    device.raw().queue_submit(queue, &submission, fence)?;
    Ok(())
}
