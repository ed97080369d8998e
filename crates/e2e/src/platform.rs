//! Host platform detection and per-platform binary layout

use std::fmt;
use std::path::{Path, PathBuf};

use specrig_common::PlatformTable;

use crate::error::{E2eError, E2eResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Linux,
    MacOs,
    Windows,
}

impl Platform {
    /// Platform of the running process
    pub fn detect() -> E2eResult<Self> {
        Self::from_os(std::env::consts::OS)
    }

    pub fn from_os(os: &str) -> E2eResult<Self> {
        match os {
            "linux" => Ok(Platform::Linux),
            "macos" => Ok(Platform::MacOs),
            "windows" => Ok(Platform::Windows),
            other => Err(E2eError::UnsupportedPlatform(other.to_string())),
        }
    }

    pub fn pick<'a, T>(&self, table: &'a PlatformTable<T>) -> &'a T {
        match self {
            Platform::Linux => &table.linux,
            Platform::MacOs => &table.macos,
            Platform::Windows => &table.windows,
        }
    }

    /// Debug build output of the host test application under `build_dir`
    pub fn binary_path(&self, build_dir: &Path, app_name: &str) -> PathBuf {
        match self {
            Platform::Linux => build_dir.join("linux/x64/debug/bundle").join(app_name),
            Platform::MacOs => build_dir
                .join("macos/Build/Products/Debug")
                .join(format!("{app_name}.app"))
                .join("Contents/MacOS")
                .join(app_name),
            Platform::Windows => build_dir
                .join("windows/x64/runner/Debug")
                .join(format!("{app_name}.exe")),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Platform::Linux => "linux",
            Platform::MacOs => "macos",
            Platform::Windows => "windows",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("linux", Platform::Linux)]
    #[test_case("macos", Platform::MacOs)]
    #[test_case("windows", Platform::Windows)]
    fn known_platforms(os: &str, expected: Platform) {
        assert_eq!(Platform::from_os(os).unwrap(), expected);
        assert_eq!(expected.to_string(), os);
    }

    #[test]
    fn unknown_platform_is_a_configuration_error() {
        let err = Platform::from_os("freebsd").unwrap_err();
        assert!(matches!(err, E2eError::UnsupportedPlatform(ref os) if os == "freebsd"));
    }

    #[test]
    fn binary_paths_follow_platform_layout() {
        let build = Path::new("/ws/build");
        assert_eq!(
            Platform::Linux.binary_path(build, "app"),
            PathBuf::from("/ws/build/linux/x64/debug/bundle/app")
        );
        assert_eq!(
            Platform::MacOs.binary_path(build, "app"),
            PathBuf::from("/ws/build/macos/Build/Products/Debug/app.app/Contents/MacOS/app")
        );
        assert_eq!(
            Platform::Windows.binary_path(build, "app"),
            PathBuf::from("/ws/build/windows/x64/runner/Debug/app.exe")
        );
    }

    #[test]
    fn pick_selects_the_platform_entry() {
        let table = PlatformTable {
            linux: 1,
            macos: 2,
            windows: 3,
        };
        assert_eq!(*Platform::MacOs.pick(&table), 2);
    }
}
