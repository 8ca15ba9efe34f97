//! Queue family resolution and queue requests.

use ash::vk;

use crate::driver::InstanceApi;
use crate::error::{GpuError, Result};

/// One queue family of a physical device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilyDescriptor {
    pub index: u32,
    pub flags: vk::QueueFlags,
    pub queue_count: u32,
}

/// Enumerate the queue families of a physical device.
pub fn queue_families<I: InstanceApi>(
    instance: &I,
    physical_device: vk::PhysicalDevice,
) -> Result<Vec<QueueFamilyDescriptor>> {
    let families = instance.queue_family_properties(physical_device);
    if families.is_empty() {
        tracing::error!("Could not get the number of queue families");
        return Err(GpuError::empty("queue families"));
    }

    Ok(families
        .iter()
        .enumerate()
        .map(|(index, family)| QueueFamilyDescriptor {
            index: index as u32,
            flags: family.queue_flags,
            queue_count: family.queue_count,
        })
        .collect())
}

/// Find the first family with at least one queue whose flags intersect `flags`.
pub fn find_queue_family<I: InstanceApi>(
    instance: &I,
    physical_device: vk::PhysicalDevice,
    flags: vk::QueueFlags,
) -> Result<u32> {
    queue_families(instance, physical_device)?
        .iter()
        .find(|family| family.queue_count > 0 && family.flags.intersects(flags))
        .map(|family| family.index)
        .ok_or_else(|| GpuError::NotFound(format!("queue family with {flags:?}")))
}

/// Find the first family that can present to `surface`.
///
/// A family whose support query fails is treated as unsupported.
pub fn find_presentation_queue_family<I: InstanceApi>(
    instance: &I,
    physical_device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
) -> Result<u32> {
    for family in queue_families(instance, physical_device)? {
        match instance.surface_support(physical_device, family.index, surface) {
            Ok(true) => return Ok(family.index),
            Ok(false) => {}
            Err(e) => {
                tracing::debug!("Presentation support query failed for family {}: {e}", family.index);
            }
        }
    }

    Err(GpuError::NotFound(
        "queue family with presentation support".to_string(),
    ))
}

/// Queue families resolved for a device.
///
/// The families may coincide; use [`QueueFamilyIndices::requests`] to get a
/// deduplicated request set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: u32,
    pub compute: u32,
    pub present: Option<u32>,
}

impl QueueFamilyIndices {
    /// Resolve graphics, compute and (given a surface) presentation families.
    pub fn resolve<I: InstanceApi>(
        instance: &I,
        physical_device: vk::PhysicalDevice,
        surface: Option<vk::SurfaceKHR>,
    ) -> Result<Self> {
        let graphics = find_queue_family(instance, physical_device, vk::QueueFlags::GRAPHICS)?;
        let compute = find_queue_family(instance, physical_device, vk::QueueFlags::COMPUTE)?;
        let present = surface
            .map(|surface| find_presentation_queue_family(instance, physical_device, surface))
            .transpose()?;

        Ok(Self {
            graphics,
            compute,
            present,
        })
    }

    /// One single-queue request per distinct family.
    pub fn requests(&self) -> QueueRequests {
        let mut requests = QueueRequests::new();
        for family in [Some(self.graphics), Some(self.compute), self.present]
            .into_iter()
            .flatten()
        {
            requests.push(QueueRequest::single(family));
        }
        requests
    }
}

/// A request for queues from one family.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueRequest {
    pub family_index: u32,
    pub priorities: Vec<f32>,
}

impl QueueRequest {
    pub fn new(family_index: u32, priorities: Vec<f32>) -> Self {
        Self {
            family_index,
            priorities,
        }
    }

    /// One queue at full priority.
    pub fn single(family_index: u32) -> Self {
        Self::new(family_index, vec![1.0])
    }

    /// Number of queues requested.
    pub fn queue_count(&self) -> u32 {
        self.priorities.len() as u32
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.priorities.is_empty() {
            return Err(GpuError::InvalidRequest(format!(
                "queue family {} requested with no priorities",
                self.family_index
            )));
        }
        if let Some(p) = self
            .priorities
            .iter()
            .find(|p| !(0.0..=1.0).contains(*p))
        {
            return Err(GpuError::InvalidRequest(format!(
                "queue priority {p} for family {} is outside [0, 1]",
                self.family_index
            )));
        }
        Ok(())
    }
}

/// Queue requests with at most one entry per family.
#[derive(Debug, Clone, Default)]
pub struct QueueRequests {
    requests: Vec<QueueRequest>,
}

impl QueueRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a request. A later request for an already-requested family is dropped.
    pub fn push(&mut self, request: QueueRequest) {
        if self.contains(request.family_index) {
            tracing::debug!(
                "Queue family {} already requested, ignoring duplicate",
                request.family_index
            );
            return;
        }
        self.requests.push(request);
    }

    pub fn contains(&self, family_index: u32) -> bool {
        self.requests
            .iter()
            .any(|request| request.family_index == family_index)
    }

    pub fn get(&self, family_index: u32) -> Option<&QueueRequest> {
        self.requests
            .iter()
            .find(|request| request.family_index == family_index)
    }

    pub fn as_slice(&self) -> &[QueueRequest] {
        &self.requests
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

impl FromIterator<QueueRequest> for QueueRequests {
    fn from_iter<T: IntoIterator<Item = QueueRequest>>(iter: T) -> Self {
        let mut requests = Self::new();
        for request in iter {
            requests.push(request);
        }
        requests
    }
}
