// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Compute device selection for model inference

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A concrete compute device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Device {
    Cpu,
    Cuda(usize),
}

impl Device {
    pub fn is_accelerator(&self) -> bool {
        matches!(self, Device::Cuda(_))
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Cuda(ordinal) => write!(f, "cuda:{}", ordinal),
        }
    }
}

impl FromStr for Device {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        match s.as_str() {
            "cpu" => Ok(Device::Cpu),
            "cuda" | "gpu" => Ok(Device::Cuda(0)),
            _ => match s.strip_prefix("cuda:") {
                Some(ordinal) => ordinal
                    .parse()
                    .map(Device::Cuda)
                    .map_err(|_| format!("invalid CUDA ordinal in '{}'", s)),
                None => Err(format!("unknown device '{}' (expected cpu, cuda or cuda:N)", s)),
            },
        }
    }
}

impl TryFrom<String> for Device {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Device> for String {
    fn from(device: Device) -> Self {
        device.to_string()
    }
}

/// What the caller asked for; resolved against what the model can run on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DevicePreference {
    /// First available accelerator, otherwise CPU
    Auto,
    #[default]
    Cpu,
    Cuda(usize),
}

impl DevicePreference {
    /// Pick a device from `available`.
    ///
    /// Fails when an explicit device is requested that is not available.
    pub fn resolve(&self, available: &[Device]) -> Result<Device> {
        match self {
            DevicePreference::Auto => Ok(available
                .iter()
                .copied()
                .find(Device::is_accelerator)
                .unwrap_or(Device::Cpu)),
            DevicePreference::Cpu => Ok(Device::Cpu),
            DevicePreference::Cuda(ordinal) => {
                let wanted = Device::Cuda(*ordinal);
                if !available.contains(&wanted) {
                    bail!(
                        "Device {} requested but model only supports [{}]",
                        wanted,
                        available.iter().map(Device::to_string).collect::<Vec<_>>().join(", ")
                    );
                }
                Ok(wanted)
            }
        }
    }
}

impl fmt::Display for DevicePreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DevicePreference::Auto => write!(f, "auto"),
            DevicePreference::Cpu => write!(f, "cpu"),
            DevicePreference::Cuda(ordinal) => write!(f, "cuda:{}", ordinal),
        }
    }
}

impl FromStr for DevicePreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("auto") {
            return Ok(DevicePreference::Auto);
        }
        match s.parse::<Device>()? {
            Device::Cpu => Ok(DevicePreference::Cpu),
            Device::Cuda(ordinal) => Ok(DevicePreference::Cuda(ordinal)),
        }
    }
}

impl TryFrom<String> for DevicePreference {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DevicePreference> for String {
    fn from(pref: DevicePreference) -> Self {
        pref.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_devices() {
        assert_eq!("cpu".parse::<Device>().unwrap(), Device::Cpu);
        assert_eq!("CUDA".parse::<Device>().unwrap(), Device::Cuda(0));
        assert_eq!("cuda:2".parse::<Device>().unwrap(), Device::Cuda(2));
        assert!("cuda:x".parse::<Device>().is_err());
        assert!("tpu".parse::<Device>().is_err());
        assert_eq!(Device::Cuda(1).to_string(), "cuda:1");
    }

    #[test]
    fn test_auto_prefers_accelerator() {
        let available = vec![Device::Cpu, Device::Cuda(0)];
        assert_eq!(DevicePreference::Auto.resolve(&available).unwrap(), Device::Cuda(0));
        assert_eq!(DevicePreference::Auto.resolve(&[Device::Cpu]).unwrap(), Device::Cpu);
    }

    #[test]
    fn test_explicit_accelerator_requires_capability() {
        assert!(DevicePreference::Cuda(0).resolve(&[Device::Cpu]).is_err());
        assert_eq!(
            DevicePreference::Cuda(1).resolve(&[Device::Cpu, Device::Cuda(1)]).unwrap(),
            Device::Cuda(1)
        );
    }

    #[test]
    fn test_preference_serde() {
        let json = serde_json::to_string(&DevicePreference::Cuda(3)).unwrap();
        assert_eq!(json, "\"cuda:3\"");
        let pref: DevicePreference = serde_json::from_str("\"auto\"").unwrap();
        assert_eq!(pref, DevicePreference::Auto);
    }
}
