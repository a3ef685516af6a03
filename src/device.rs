use crate::config::DevicePreference;

/// The compute device an engine runs its model on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ComputeDevice {
    /// A specialized device such as a GPU.
    Accelerator,
    /// The fallback compute device.
    Cpu,
}

impl ComputeDevice {
    /// Resolves a preference against what the host offers.
    pub fn select(preference: DevicePreference, accelerator_available: bool) -> Self {
        match preference {
            DevicePreference::Accelerator if accelerator_available => ComputeDevice::Accelerator,
            DevicePreference::Accelerator => {
                log::warn!("No accelerator available, defaulting to cpu");
                ComputeDevice::Cpu
            }
            DevicePreference::Cpu => ComputeDevice::Cpu,
        }
    }

    /// Whether this is the accelerator.
    pub fn is_accelerator(&self) -> bool {
        matches!(self, ComputeDevice::Accelerator)
    }

    /// Returns the device as a string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ComputeDevice::Accelerator => "accelerator",
            ComputeDevice::Cpu => "cpu",
        }
    }
}

impl std::fmt::Display for ComputeDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
