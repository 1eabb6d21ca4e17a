// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Execution device selection.
use std::fmt;
use std::str::FromStr;

/// Hardware device for inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Device {
    /// CPU (Central Processing Unit).
    #[default]
    Cpu,
    /// CUDA (Compute Unified Device Architecture) for NVIDIA GPUs.
    /// The argument specifies the device index (e.g., 0 for the first GPU).
    Cuda(usize),
    /// `CoreML` (Apple Core Machine Learning).
    CoreMl,
}

impl Device {
    /// Returns `true` if the device needs an execution provider that was not
    /// compiled into this build.
    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        match self {
            Self::Cpu => false,
            Self::Cuda(_) => !cfg!(feature = "cuda"),
            Self::CoreMl => !cfg!(feature = "coreml"),
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda(i) => write!(f, "cuda:{i}"),
            Self::CoreMl => write!(f, "coreml"),
        }
    }
}

impl FromStr for Device {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.to_lowercase();
        match s.as_str() {
            "cpu" => Ok(Self::Cpu),
            "coreml" | "mps" => Ok(Self::CoreMl),
            _ => s.strip_prefix("cuda").map_or_else(
                || Err(format!("Unknown device: {s}")),
                |rest| {
                    if rest.is_empty() {
                        return Ok(Self::Cuda(0));
                    }
                    parse_device_index(rest)
                        .map(Self::Cuda)
                        .ok_or_else(|| format!("Invalid CUDA device index: {s}"))
                },
            ),
        }
    }
}

/// Helper to parse device index from string (e.g. ":0")
fn parse_device_index(s: &str) -> Option<usize> {
    s.strip_prefix(':')
        .and_then(|index_str| index_str.parse::<usize>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_device() {
        assert_eq!(Device::from_str("cpu").unwrap(), Device::Cpu);
        assert_eq!(Device::from_str("CPU").unwrap(), Device::Cpu);
        assert_eq!(Device::from_str("cuda").unwrap(), Device::Cuda(0));
        assert_eq!(Device::from_str("cuda:1").unwrap(), Device::Cuda(1));
        assert_eq!(Device::from_str("coreml").unwrap(), Device::CoreMl);
        assert_eq!(Device::from_str("mps").unwrap(), Device::CoreMl);
        assert!(Device::from_str("cuda:x").is_err());
        assert!(Device::from_str("tpu").is_err());
    }

    #[test]
    fn test_display_round_trip() {
        for device in [Device::Cpu, Device::Cuda(2), Device::CoreMl] {
            assert_eq!(device.to_string().parse::<Device>().unwrap(), device);
        }
    }

    #[test]
    fn test_cpu_always_available() {
        assert!(!Device::Cpu.is_unavailable());
    }
}
