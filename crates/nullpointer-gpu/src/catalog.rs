//! Extension and layer catalogs.

use ash::vk;
use std::ffi::CStr;

use crate::driver::{EntryApi, InstanceApi};
use crate::error::{GpuError, Result};

/// A named, versioned extension as reported by the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionRecord {
    pub name: String,
    pub version: u32,
}

impl ExtensionRecord {
    fn from_properties(props: &vk::ExtensionProperties) -> Option<Self> {
        let name = props.extension_name_as_c_str().ok()?.to_str().ok()?;
        Some(Self {
            name: name.to_owned(),
            version: props.spec_version,
        })
    }
}

/// The extensions supported by the runtime or by one device.
#[derive(Debug, Clone, Default)]
pub struct ExtensionCatalog {
    records: Vec<ExtensionRecord>,
}

impl ExtensionCatalog {
    pub fn new(records: Vec<ExtensionRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[ExtensionRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Whether an extension with exactly this name is present.
    pub fn is_supported(&self, name: &str) -> bool {
        self.records.iter().any(|record| record.name == name)
    }

    /// Look up a record by name.
    pub fn get(&self, name: &str) -> Option<&ExtensionRecord> {
        self.records.iter().find(|record| record.name == name)
    }

    /// The first of `names` that this catalog does not contain.
    pub fn first_missing<'a, S: AsRef<str>>(&self, names: &'a [S]) -> Option<&'a str> {
        names
            .iter()
            .map(AsRef::as_ref)
            .find(|name| !self.is_supported(name))
    }

    /// Log every record at debug level.
    pub fn log_available(&self) {
        for record in &self.records {
            tracing::debug!(
                "Available extension: {} (spec version {})",
                record.name,
                record.version
            );
        }
    }

    fn from_properties(what: &'static str, props: &[vk::ExtensionProperties]) -> Result<Self> {
        if props.is_empty() {
            tracing::error!("Could not enumerate {what}: driver reported none");
            return Err(GpuError::empty(what));
        }
        Ok(Self::new(
            props
                .iter()
                .filter_map(ExtensionRecord::from_properties)
                .collect(),
        ))
    }
}

/// Query the instance-level extensions.
///
/// Zero extensions is treated as a failed enumeration.
pub fn query_instance_extensions<E: EntryApi>(entry: &E) -> Result<ExtensionCatalog> {
    let what = "instance extensions";
    let props = entry
        .instance_extensions()
        .map_err(|e| GpuError::query(what, e))?;
    ExtensionCatalog::from_properties(what, &props)
}

/// Query the extensions of one physical device.
pub fn query_device_extensions<I: InstanceApi>(
    instance: &I,
    physical_device: vk::PhysicalDevice,
) -> Result<ExtensionCatalog> {
    let what = "device extensions";
    let props = instance
        .device_extensions(physical_device)
        .map_err(|e| GpuError::query(what, e))?;
    ExtensionCatalog::from_properties(what, &props)
}

/// Query the names of the available instance layers. An empty list is valid.
pub fn query_instance_layers<E: EntryApi>(entry: &E) -> Result<Vec<String>> {
    let layers = entry
        .instance_layers()
        .map_err(|e| GpuError::query("instance layers", e))?;

    Ok(layers
        .iter()
        .filter_map(|layer| layer.layer_name_as_c_str().ok())
        .filter_map(|name| name.to_str().ok())
        .map(String::from)
        .collect())
}

/// Convert a C extension name into an owned string.
pub(crate) fn name_of(name: &CStr) -> String {
    name.to_string_lossy().into_owned()
}
