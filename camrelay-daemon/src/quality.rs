//! Video quality selection

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Encode targets for one quality level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoProfile {
    pub width: u32,
    pub height: u32,
    pub framerate: u32,
    pub bitrate_kbps: u32,
    pub maxrate_kbps: u32,
    pub bufsize_kbps: u32,
}

impl VideoProfile {
    /// Keyframe every two seconds.
    pub fn keyframe_interval(&self) -> u32 {
        self.framerate * 2
    }

    pub fn low() -> Self {
        Self {
            width: 854,
            height: 480,
            framerate: 30,
            bitrate_kbps: 1500,
            maxrate_kbps: 2000,
            bufsize_kbps: 3000,
        }
    }

    pub fn standard() -> Self {
        Self {
            width: 1280,
            height: 720,
            framerate: 30,
            bitrate_kbps: 3000,
            maxrate_kbps: 4000,
            bufsize_kbps: 6000,
        }
    }

    pub fn high() -> Self {
        Self {
            width: 1920,
            height: 1080,
            framerate: 30,
            bitrate_kbps: 4500,
            maxrate_kbps: 6000,
            bufsize_kbps: 9000,
        }
    }
}

/// Built-in profile table.
pub fn default_profiles() -> BTreeMap<String, VideoProfile> {
    BTreeMap::from([
        ("low".to_string(), VideoProfile::low()),
        ("standard".to_string(), VideoProfile::standard()),
        ("high".to_string(), VideoProfile::high()),
    ])
}

/// Picks the video profile for the next relay session.
pub trait QualityStrategy: Send + Sync {
    fn select(&self) -> VideoProfile;
}

/// Always the configured profile.
#[derive(Debug, Clone)]
pub struct StaticQuality {
    profile: VideoProfile,
}

impl StaticQuality {
    pub fn new(profile: VideoProfile) -> Self {
        Self { profile }
    }

    /// Look `name` up in `profiles`, falling back to `standard`.
    pub fn from_table(name: &str, profiles: &BTreeMap<String, VideoProfile>) -> Self {
        let profile = match profiles.get(name) {
            Some(profile) => profile.clone(),
            None => {
                warn!("Unknown quality profile '{}', using standard", name);
                profiles
                    .get("standard")
                    .cloned()
                    .unwrap_or_else(VideoProfile::standard)
            }
        };
        Self { profile }
    }
}

impl QualityStrategy for StaticQuality {
    fn select(&self) -> VideoProfile {
        self.profile.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyframe_interval() {
        assert_eq!(VideoProfile::standard().keyframe_interval(), 60);
    }

    #[test]
    fn test_static_selects_named_profile() {
        let strategy = StaticQuality::from_table("high", &default_profiles());
        assert_eq!(strategy.select(), VideoProfile::high());
    }

    #[test]
    fn test_unknown_profile_falls_back() {
        let strategy = StaticQuality::from_table("ultra", &default_profiles());
        assert_eq!(strategy.select(), VideoProfile::standard());

        let strategy = StaticQuality::from_table("ultra", &BTreeMap::new());
        assert_eq!(strategy.select(), VideoProfile::standard());
    }
}
