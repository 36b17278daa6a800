use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A supported (operating system, CPU architecture) pair.
///
/// Closed set on purpose: anything the remote host reports outside this enum
/// is rejected at the detection boundary instead of being carried around as a
/// free-form string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Platform {
    #[serde(rename = "linux-amd64")]
    LinuxAmd64,
    #[serde(rename = "linux-arm64")]
    LinuxArm64,
}

impl Platform {
    pub const ALL: &[Platform] = &[Platform::LinuxAmd64, Platform::LinuxArm64];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::LinuxAmd64 => "linux-amd64",
            Platform::LinuxArm64 => "linux-arm64",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown platform: {0}")]
pub struct ParsePlatformError(String);

impl FromStr for Platform {
    type Err = ParsePlatformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "linux-amd64" => Ok(Platform::LinuxAmd64),
            "linux-arm64" => Ok(Platform::LinuxArm64),
            other => Err(ParsePlatformError(other.to_string())),
        }
    }
}

/// Read-only mapping from [`Platform`] to the URL of the agent binary archive
/// built for it. Partial maps are allowed; a missing entry surfaces as an
/// install-time error rather than a construction failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BinarySource {
    urls: BTreeMap<Platform, String>,
}

impl BinarySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_url(mut self, platform: Platform, url: impl Into<String>) -> Self {
        self.urls.insert(platform, url.into());
        self
    }

    pub fn url_for(&self, platform: Platform) -> Option<&str> {
        self.urls.get(&platform).map(String::as_str)
    }

    pub fn platforms(&self) -> impl Iterator<Item = Platform> + '_ {
        self.urls.keys().copied()
    }
}

impl From<BTreeMap<Platform, String>> for BinarySource {
    fn from(urls: BTreeMap<Platform, String>) -> Self {
        Self { urls }
    }
}

/// Where the agent lives on the remote host.
///
/// The binary name drives every remote path: the install path under
/// `install_dir`, the downloaded archive under `staging_dir`, and the staged
/// binary the archive extracts to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallTarget {
    name: String,
    #[serde(default = "default_install_dir")]
    install_dir: String,
    #[serde(default = "default_staging_dir")]
    staging_dir: String,
}

fn default_install_dir() -> String {
    "/usr/local/bin".to_string()
}

fn default_staging_dir() -> String {
    "/tmp".to_string()
}

impl InstallTarget {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            install_dir: default_install_dir(),
            staging_dir: default_staging_dir(),
        }
    }

    pub fn with_install_dir(mut self, dir: impl Into<String>) -> Self {
        self.install_dir = dir.into();
        self
    }

    pub fn with_staging_dir(mut self, dir: impl Into<String>) -> Self {
        self.staging_dir = dir.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn install_dir(&self) -> &str {
        &self.install_dir
    }

    pub fn staging_dir(&self) -> &str {
        &self.staging_dir
    }

    pub fn install_path(&self) -> String {
        format!("{}/{}", self.install_dir, self.name)
    }

    pub fn archive_path(&self) -> String {
        format!("{}/{}_install.tar.gz", self.staging_dir, self.name)
    }

    pub fn staged_path(&self) -> String {
        format!("{}/{}", self.staging_dir, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_round_trips_through_display_and_from_str() {
        for platform in Platform::ALL {
            let parsed: Platform = platform.to_string().parse().expect("failed to parse");
            assert_eq!(parsed, *platform);
        }
    }

    #[test]
    fn platform_rejects_unknown_names() {
        assert!("linux-riscv64".parse::<Platform>().is_err());
    }

    #[test]
    fn binary_source_deserializes_from_json_object() {
        let source: BinarySource = serde_json::from_str(
            r#"{ "linux-amd64": "https://example.com/amd64.tar.gz" }"#,
        )
        .expect("failed to deserialize BinarySource");

        assert_eq!(
            source.url_for(Platform::LinuxAmd64),
            Some("https://example.com/amd64.tar.gz")
        );
        assert_eq!(source.url_for(Platform::LinuxArm64), None);
    }

    #[test]
    fn install_target_derives_remote_paths_from_name() {
        let target = InstallTarget::new("daytona");
        assert_eq!(target.install_path(), "/usr/local/bin/daytona");
        assert_eq!(target.archive_path(), "/tmp/daytona_install.tar.gz");
        assert_eq!(target.staged_path(), "/tmp/daytona");
    }

    #[test]
    fn install_target_honors_custom_directories() {
        let target = InstallTarget::new("agentd")
            .with_install_dir("/opt/agentd/bin")
            .with_staging_dir("/var/tmp");
        assert_eq!(target.install_path(), "/opt/agentd/bin/agentd");
        assert_eq!(target.archive_path(), "/var/tmp/agentd_install.tar.gz");
    }
}
