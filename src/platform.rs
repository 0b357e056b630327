//! Platform detection and per-OS default directories.
use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;

/// Detected operating system platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Os {
    /// Linux distributions.
    Linux,
    /// Microsoft Windows.
    Windows,
    /// Apple macOS.
    MacOs,
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Linux => write!(f, "linux"),
            Self::Windows => write!(f, "windows"),
            Self::MacOs => write!(f, "macos"),
        }
    }
}

/// Platform information for the current system.
#[derive(Debug, Clone, Copy)]
pub struct Platform {
    /// Operating system the binary runs on.
    pub os: Os,
}

impl Platform {
    /// Detect the current platform.
    #[must_use]
    pub const fn detect() -> Self {
        Self {
            os: Self::detect_os(),
        }
    }

    /// Create a platform with an explicit OS (for testing).
    #[cfg(test)]
    pub const fn new(os: Os) -> Self {
        Self { os }
    }

    /// Whether this platform is Windows.
    #[must_use]
    pub fn is_windows(&self) -> bool {
        self.os == Os::Windows
    }

    /// Default directory for downloaded artifacts: `$XDG_DOWNLOAD_DIR`, else
    /// `Downloads` under the user's home directory.
    #[must_use]
    pub fn default_download_dir(&self) -> Option<PathBuf> {
        self.download_dir_from(|key| std::env::var_os(key))
    }

    /// Directory holding per-user configuration: `$XDG_CONFIG_HOME`, else
    /// `%APPDATA%` on Windows, else `~/.config`.
    #[must_use]
    pub fn config_dir(&self) -> Option<PathBuf> {
        self.config_dir_from(|key| std::env::var_os(key))
    }

    fn download_dir_from(&self, lookup: impl Fn(&str) -> Option<OsString>) -> Option<PathBuf> {
        if let Some(dir) = non_empty(lookup("XDG_DOWNLOAD_DIR")) {
            return Some(PathBuf::from(dir));
        }
        self.home_from(&lookup).map(|home| home.join("Downloads"))
    }

    fn config_dir_from(&self, lookup: impl Fn(&str) -> Option<OsString>) -> Option<PathBuf> {
        if let Some(dir) = non_empty(lookup("XDG_CONFIG_HOME")) {
            return Some(PathBuf::from(dir));
        }
        if self.is_windows()
            && let Some(dir) = non_empty(lookup("APPDATA"))
        {
            return Some(PathBuf::from(dir));
        }
        self.home_from(&lookup).map(|home| home.join(".config"))
    }

    fn home_from(&self, lookup: &impl Fn(&str) -> Option<OsString>) -> Option<PathBuf> {
        let (first, second) = if self.is_windows() {
            ("USERPROFILE", "HOME")
        } else {
            ("HOME", "USERPROFILE")
        };
        non_empty(lookup(first))
            .or_else(|| non_empty(lookup(second)))
            .map(PathBuf::from)
    }

    const fn detect_os() -> Os {
        if cfg!(target_os = "windows") {
            Os::Windows
        } else if cfg!(target_os = "macos") {
            Os::MacOs
        } else {
            // Other Unix-like systems follow Linux conventions.
            Os::Linux
        }
    }
}

fn non_empty(value: Option<OsString>) -> Option<OsString> {
    value.filter(|v| !v.is_empty())
}
