//! Version information and build metadata display

use std::fmt;

/// Version and build information for camrelay
pub struct VersionInfo {
    /// Package version from Cargo.toml
    pub daemon_version: &'static str,
    /// Target triple (e.g., x86_64-unknown-linux-gnu)
    pub target: &'static str,
    /// Build profile (debug or release)
    pub profile: &'static str,
    /// Git commit hash (if available)
    pub git_commit: Option<&'static str>,
    /// Build timestamp
    pub build_timestamp: &'static str,
}

impl VersionInfo {
    pub fn current() -> Self {
        Self {
            daemon_version: env!("CARGO_PKG_VERSION"),
            target: env!("TARGET"),
            profile: if cfg!(debug_assertions) {
                "debug"
            } else {
                "release"
            },
            git_commit: option_env!("GIT_COMMIT_HASH"),
            build_timestamp: env!("BUILD_TIMESTAMP"),
        }
    }

    /// Transcoder requirements
    pub fn transcoder_requirements(&self) -> Vec<&'static str> {
        vec![
            "ffmpeg built with libsrt (SRT input)",
            "ffmpeg built with openssl or gnutls (RTMPS output)",
            "libx264 and native AAC encoders",
        ]
    }
}

impl fmt::Display for VersionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "camrelay-daemon {}", self.daemon_version)?;
        writeln!(f)?;

        writeln!(f, "Build Information:")?;
        writeln!(f, "  Target:       {}", self.target)?;
        writeln!(f, "  Profile:      {}", self.profile)?;
        writeln!(f, "  Build Date:   {}", self.build_timestamp)?;

        if let Some(commit) = self.git_commit {
            writeln!(f, "  Git Commit:   {}", commit)?;
        }

        writeln!(f)?;
        writeln!(f, "Transcoder Requirements:")?;
        for req in self.transcoder_requirements() {
            writeln!(f, "  • {}", req)?;
        }

        Ok(())
    }
}

/// Short version string
pub fn version_short() -> String {
    format!("camrelay-daemon {}", env!("CARGO_PKG_VERSION"))
}

/// Long version string (for `version --verbose`)
pub fn version_long() -> String {
    VersionInfo::current().to_string()
}
