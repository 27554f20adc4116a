//! Process-wide hostname resolution.
//!
//! The hostname is resolved once when an adapter is built and then shared
//! read-only with every adapter in the process.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Default location of the mounted host identity file.
pub const DEFAULT_HOST_FILE: &str = "/etc/host_hostname";

const KERNEL_HOSTNAME: &str = "/proc/sys/kernel/hostname";

/// The resolved hostname and where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostIdentity {
    hostname: Arc<str>,
    from_host_file: bool,
}

impl HostIdentity {
    /// Resolves the hostname, preferring the host identity file.
    pub fn resolve(host_file: &Path) -> Self {
        match read_non_empty(host_file) {
            Some(hostname) => {
                info!(path = %host_file.display(), hostname = %hostname, "Using hostname from host identity file");
                Self::from_host_file(hostname)
            }
            None => {
                let hostname = os_hostname();
                debug!(hostname = %hostname, "Host identity file not available, using OS hostname");
                Self::from_os(hostname)
            }
        }
    }

    pub fn from_host_file(hostname: impl Into<Arc<str>>) -> Self {
        Self {
            hostname: hostname.into(),
            from_host_file: true,
        }
    }

    pub fn from_os(hostname: impl Into<Arc<str>>) -> Self {
        Self {
            hostname: hostname.into(),
            from_host_file: false,
        }
    }

    pub fn hostname(&self) -> Arc<str> {
        Arc::clone(&self.hostname)
    }

    /// Whether the host identity file supplied the hostname.
    ///
    /// When it did, it takes precedence over any configured hostname
    /// template expression.
    pub fn is_from_host_file(&self) -> bool {
        self.from_host_file
    }
}

fn read_non_empty(path: &Path) -> Option<String> {
    let content = fs::read_to_string(path).ok()?;
    let trimmed = content.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Hostname reported by the operating system.
pub fn os_hostname() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.is_empty())
        .or_else(|| read_non_empty(Path::new(KERNEL_HOSTNAME)))
        .unwrap_or_else(|| "localhost".to_string())
}
