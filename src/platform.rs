//! Host platform collaborator: static device metadata and live telemetry

use crate::config::DeviceSection;
use nix::sys::statvfs::statvfs;
use std::path::{Path, PathBuf};

/// Metadata announced in the registration record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceMetadata {
    pub model: String,
    pub os_version: String,
    pub app_version: String,
    pub screen_resolution: String,
    pub location: String,
}

impl From<&DeviceSection> for DeviceMetadata {
    fn from(section: &DeviceSection) -> Self {
        Self {
            model: section.model.clone(),
            os_version: section.os_version.clone(),
            app_version: section.app_version.clone(),
            screen_resolution: section.screen_resolution.clone(),
            location: section.location.clone(),
        }
    }
}

/// Point-in-time readings attached to each heartbeat
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Telemetry {
    pub battery_level: Option<u8>,
    pub storage_info: String,
    pub memory_info: String,
}

/// Platform capability; implementations must be cheap and must not block for long
pub trait DevicePlatform: Send + Sync {
    fn metadata(&self) -> DeviceMetadata;
    fn telemetry(&self) -> Telemetry;
}

const UNKNOWN: &str = "unknown";

/// Linux host platform reading procfs, sysfs and the filesystem holding the state file
#[derive(Debug, Clone)]
pub struct HostPlatform {
    metadata: DeviceMetadata,
    storage_path: PathBuf,
}

impl HostPlatform {
    pub fn new(metadata: DeviceMetadata) -> Self {
        Self {
            metadata,
            storage_path: PathBuf::from("."),
        }
    }

    pub fn from_config(section: &DeviceSection) -> Self {
        Self::new(section.into()).with_storage_path(section.state_file.clone())
    }

    /// Report free space for the filesystem containing `path`
    pub fn with_storage_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage_path = path.into();
        self
    }
}

impl DevicePlatform for HostPlatform {
    fn metadata(&self) -> DeviceMetadata {
        self.metadata.clone()
    }

    fn telemetry(&self) -> Telemetry {
        let memory_info = std::fs::read_to_string("/proc/meminfo")
            .ok()
            .and_then(|raw| summarize_meminfo(&raw))
            .unwrap_or_else(|| UNKNOWN.to_string());

        Telemetry {
            battery_level: read_battery_level(Path::new("/sys/class/power_supply")),
            storage_info: read_storage_info(&self.storage_path)
                .unwrap_or_else(|| UNKNOWN.to_string()),
            memory_info,
        }
    }
}

/// `"<available>/<total> MB"` from a /proc/meminfo document
fn summarize_meminfo(raw: &str) -> Option<String> {
    let field = |name: &str| -> Option<u64> {
        raw.lines()
            .find(|line| line.starts_with(name))
            .and_then(|line| line.split_whitespace().nth(1))
            .and_then(|kb| kb.parse::<u64>().ok())
    };

    let total_kb = field("MemTotal:")?;
    let available_kb = field("MemAvailable:").or_else(|| field("MemFree:"))?;
    Some(format_megabytes(available_kb * 1024, total_kb * 1024))
}

fn format_megabytes(available_bytes: u64, total_bytes: u64) -> String {
    const MB: u64 = 1024 * 1024;
    format!("{}/{} MB", available_bytes / MB, total_bytes / MB)
}

/// `"<available>/<total> MB"` for the filesystem holding `path`.
///
/// The state file may not exist yet, so the nearest existing ancestor is used.
fn read_storage_info(path: &Path) -> Option<String> {
    let stat = path
        .ancestors()
        .filter(|p| !p.as_os_str().is_empty())
        .find_map(|p| statvfs(p).ok())
        .or_else(|| statvfs(".").ok())?;

    let unit = stat.fragment_size() as u64;
    let available = (stat.blocks_available() as u64).saturating_mul(unit);
    let total = (stat.blocks() as u64).saturating_mul(unit);
    (total > 0).then(|| format_megabytes(available, total))
}

fn read_battery_level(power_supply: &Path) -> Option<u8> {
    let entries = std::fs::read_dir(power_supply).ok()?;
    entries
        .filter_map(Result::ok)
        .filter_map(|entry| std::fs::read_to_string(entry.path().join("capacity")).ok())
        .find_map(|raw| raw.trim().parse::<u8>().ok())
        .map(|level| level.min(100))
}

/// Fixed readings, for tests and headless deployments
#[derive(Debug, Clone)]
pub struct StaticPlatform {
    pub metadata: DeviceMetadata,
    pub telemetry: Telemetry,
}

impl Default for StaticPlatform {
    fn default() -> Self {
        Self {
            metadata: DeviceMetadata::from(&DeviceSection::default()),
            telemetry: Telemetry {
                battery_level: Some(100),
                storage_info: "16384/32768 MB".to_string(),
                memory_info: "1024/2048 MB".to_string(),
            },
        }
    }
}

impl DevicePlatform for StaticPlatform {
    fn metadata(&self) -> DeviceMetadata {
        self.metadata.clone()
    }

    fn telemetry(&self) -> Telemetry {
        self.telemetry.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summarize_meminfo() {
        let raw = "MemTotal:        2048000 kB\nMemFree:          100000 kB\nMemAvailable:    1024000 kB\n";
        assert_eq!(summarize_meminfo(raw).as_deref(), Some("1000/2000 MB"));
    }

    #[test]
    fn test_summarize_meminfo_falls_back_to_free() {
        let raw = "MemTotal: 4096 kB\nMemFree: 2048 kB\n";
        assert_eq!(summarize_meminfo(raw).as_deref(), Some("2/4 MB"));
    }

    #[test]
    fn test_summarize_meminfo_garbage() {
        assert_eq!(summarize_meminfo("nothing here"), None);
    }

    #[test]
    fn test_read_battery_level() {
        let dir = tempfile::tempdir().unwrap();
        let bat = dir.path().join("BAT0");
        std::fs::create_dir(&bat).unwrap();
        std::fs::write(bat.join("capacity"), "87\n").unwrap();

        assert_eq!(read_battery_level(dir.path()), Some(87));
    }

    #[test]
    fn test_read_battery_level_missing() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(read_battery_level(&dir.path().join("absent")), None);
    }

    #[test]
    fn test_format_megabytes() {
        assert_eq!(format_megabytes(3 * 1024 * 1024 + 17, 8 * 1024 * 1024), "3/8 MB");
        assert_eq!(format_megabytes(0, 0), "0/0 MB");
    }

    #[test]
    fn test_read_storage_info_for_missing_state_file() {
        let dir = tempfile::tempdir().unwrap();
        let state_file = dir.path().join("not-yet").join("state.json");

        let info = read_storage_info(&state_file).unwrap();
        let (available, total) = info
            .strip_suffix(" MB")
            .and_then(|s| s.split_once('/'))
            .unwrap();
        let available: u64 = available.parse().unwrap();
        let total: u64 = total.parse().unwrap();
        assert!(available <= total);
    }

    #[test]
    fn test_host_telemetry_reports_storage() {
        let dir = tempfile::tempdir().unwrap();
        let mut section = DeviceSection::default();
        section.state_file = dir.path().join("state.json");

        let telemetry = HostPlatform::from_config(&section).telemetry();
        assert_ne!(telemetry.storage_info, UNKNOWN);
        assert!(telemetry.storage_info.ends_with(" MB"));
    }

    #[test]
    fn test_metadata_from_config() {
        let mut section = DeviceSection::default();
        section.location = "Hall B".to_string();
        let platform = HostPlatform::from_config(&section);
        assert_eq!(platform.metadata().location, "Hall B");
    }
}
