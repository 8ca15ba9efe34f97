//! Physical device capability descriptions.

use ash::vk;
use bitflags::bitflags;

use crate::driver::InstanceApi;

/// GPU vendor identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Intel,
    Apple,
    Other(u32),
}

impl GpuVendor {
    /// Identify vendor from PCI vendor ID.
    pub fn from_vendor_id(id: u32) -> Self {
        match id {
            0x10DE => Self::Nvidia,
            0x1002 => Self::Amd,
            0x8086 => Self::Intel,
            0x106B => Self::Apple,
            other => Self::Other(other),
        }
    }
}

bitflags! {
    /// Boolean physical-device features a caller can require.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DeviceFeatures: u64 {
        const ROBUST_BUFFER_ACCESS = 1 << 0;
        const FULL_DRAW_INDEX_UINT32 = 1 << 1;
        const IMAGE_CUBE_ARRAY = 1 << 2;
        const INDEPENDENT_BLEND = 1 << 3;
        const GEOMETRY_SHADER = 1 << 4;
        const TESSELLATION_SHADER = 1 << 5;
        const SAMPLE_RATE_SHADING = 1 << 6;
        const MULTI_DRAW_INDIRECT = 1 << 7;
        const DEPTH_CLAMP = 1 << 8;
        const FILL_MODE_NON_SOLID = 1 << 9;
        const WIDE_LINES = 1 << 10;
        const LARGE_POINTS = 1 << 11;
        const MULTI_VIEWPORT = 1 << 12;
        const SAMPLER_ANISOTROPY = 1 << 13;
        const TEXTURE_COMPRESSION_BC = 1 << 14;
        const SHADER_FLOAT64 = 1 << 15;
        const SHADER_INT64 = 1 << 16;
        const SHADER_INT16 = 1 << 17;
    }
}

macro_rules! feature_fields {
    ($($flag:ident => $field:ident),* $(,)?) => {
        impl DeviceFeatures {
            /// The subset of known features a device reports as supported.
            pub fn supported_by(features: &vk::PhysicalDeviceFeatures) -> Self {
                let mut set = Self::empty();
                $(
                    if features.$field == vk::TRUE {
                        set |= Self::$flag;
                    }
                )*
                set
            }

            /// A feature struct with exactly these features enabled.
            pub fn to_vk(self) -> vk::PhysicalDeviceFeatures {
                let mut features = vk::PhysicalDeviceFeatures::default();
                $(
                    if self.contains(Self::$flag) {
                        features.$field = vk::TRUE;
                    }
                )*
                features
            }
        }
    };
}

feature_fields! {
    ROBUST_BUFFER_ACCESS => robust_buffer_access,
    FULL_DRAW_INDEX_UINT32 => full_draw_index_uint32,
    IMAGE_CUBE_ARRAY => image_cube_array,
    INDEPENDENT_BLEND => independent_blend,
    GEOMETRY_SHADER => geometry_shader,
    TESSELLATION_SHADER => tessellation_shader,
    SAMPLE_RATE_SHADING => sample_rate_shading,
    MULTI_DRAW_INDIRECT => multi_draw_indirect,
    DEPTH_CLAMP => depth_clamp,
    FILL_MODE_NON_SOLID => fill_mode_non_solid,
    WIDE_LINES => wide_lines,
    LARGE_POINTS => large_points,
    MULTI_VIEWPORT => multi_viewport,
    SAMPLER_ANISOTROPY => sampler_anisotropy,
    TEXTURE_COMPRESSION_BC => texture_compression_bc,
    SHADER_FLOAT64 => shader_float64,
    SHADER_INT64 => shader_int64,
    SHADER_INT16 => shader_int16,
}

impl DeviceFeatures {
    /// Names of the features in `self` that `supported` lacks.
    pub fn missing_from(self, supported: Self) -> Vec<&'static str> {
        self.difference(supported)
            .iter_names()
            .map(|(name, _)| name)
            .collect()
    }
}

/// Identifying information about a physical device, for diagnostics.
#[derive(Debug, Clone)]
pub struct DeviceSummary {
    pub name: String,
    pub vendor: GpuVendor,
    pub device_type: vk::PhysicalDeviceType,
    pub api_version: u32,
    pub driver_version: u32,
}

impl DeviceSummary {
    /// Query the properties of a physical device.
    pub fn query<I: InstanceApi>(instance: &I, physical_device: vk::PhysicalDevice) -> Self {
        let properties = instance.device_properties(physical_device);
        let name = properties
            .device_name_as_c_str()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "unknown".to_string());

        Self {
            name,
            vendor: GpuVendor::from_vendor_id(properties.vendor_id),
            device_type: properties.device_type,
            api_version: properties.api_version,
            driver_version: properties.driver_version,
        }
    }

    /// Get a human-readable summary.
    pub fn summary(&self) -> String {
        format!(
            "{} ({:?}, {:?}) - Vulkan {}.{}.{}",
            self.name,
            self.vendor,
            self.device_type,
            vk::api_version_major(self.api_version),
            vk::api_version_minor(self.api_version),
            vk::api_version_patch(self.api_version),
        )
    }
}
