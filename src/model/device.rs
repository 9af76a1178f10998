//! # Device Detection
//!
//! Resolves which compute device the loaded model reports itself on. The
//! inference backend owns the real device handle; this module only produces
//! the human-readable device string surfaced by the model status endpoint
//! (`cuda:0`, `metal`, `cpu`).

use std::sync::OnceLock;
use tracing::{debug, info};

/// Cached resolved device so detection runs once per process
static RESOLVED_DEVICE: OnceLock<String> = OnceLock::new();

/// Device preferences for model inference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DevicePreference {
    /// Automatically select the best available device
    #[default]
    Auto,
    /// Force CPU usage
    Cpu,
    /// Force CUDA GPU usage (will fall back to CPU if not available)
    Cuda,
    /// Force Metal GPU usage (will fall back to CPU if not available)
    Metal,
}

impl std::str::FromStr for DevicePreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" | "automatic" => Ok(DevicePreference::Auto),
            "cpu" => Ok(DevicePreference::Cpu),
            "cuda" | "gpu" => Ok(DevicePreference::Cuda),
            "metal" => Ok(DevicePreference::Metal),
            _ => Err(format!("Unknown device preference: {}", s)),
        }
    }
}

/// Resolve the device string for the given preference, caching the result.
pub fn resolve_device(preference: DevicePreference) -> &'static str {
    RESOLVED_DEVICE
        .get_or_init(|| {
            let device = detect(preference);
            info!("Resolved inference device: {}", device);
            device
        })
        .as_str()
}

fn detect(preference: DevicePreference) -> String {
    match preference {
        DevicePreference::Cpu => "cpu".to_string(),
        DevicePreference::Cuda => {
            if cuda_available() {
                "cuda:0".to_string()
            } else {
                debug!("CUDA requested but not available, falling back to CPU");
                "cpu".to_string()
            }
        }
        DevicePreference::Metal => {
            if metal_available() {
                "metal".to_string()
            } else {
                debug!("Metal requested but not available, falling back to CPU");
                "cpu".to_string()
            }
        }
        DevicePreference::Auto => {
            if cuda_available() {
                "cuda:0".to_string()
            } else if metal_available() {
                "metal".to_string()
            } else {
                "cpu".to_string()
            }
        }
    }
}

fn cuda_available() -> bool {
    std::path::Path::new("/proc/driver/nvidia").exists()
}

fn metal_available() -> bool {
    cfg!(target_os = "macos")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_preference_parsing() {
        assert_eq!(DevicePreference::from_str("auto").unwrap(), DevicePreference::Auto);
        assert_eq!(DevicePreference::from_str("gpu").unwrap(), DevicePreference::Cuda);
        assert_eq!(DevicePreference::from_str("CPU").unwrap(), DevicePreference::Cpu);
        assert!(DevicePreference::from_str("tpu").is_err());
    }

    #[test]
    fn test_cpu_preference_always_resolves_to_cpu() {
        assert_eq!(detect(DevicePreference::Cpu), "cpu");
    }
}
