use std::fmt;

use serde::Serialize;

/// What was built, and how.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildInfo {
    pub version: String,
    pub repo_version: String,
    pub build_profile: String,
    pub build_features: String,
    pub build_timestamp: String,
}

impl BuildInfo {
    pub fn new(
        version: &str,
        repo_version: Option<&str>,
        build_profile: Option<&str>,
        build_features: Option<&str>,
        build_timestamp: Option<&str>,
    ) -> Self {
        let or_unknown = |value: Option<&str>| value.unwrap_or("unknown").to_string();
        Self {
            version: version.to_string(),
            repo_version: repo_version.unwrap_or(version).to_string(),
            build_profile: or_unknown(build_profile),
            build_features: or_unknown(build_features),
            build_timestamp: or_unknown(build_timestamp),
        }
    }
}

impl fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}, {} build, features: {})",
            self.version, self.repo_version, self.build_profile, self.build_features
        )
    }
}

/// Build information of the crate the macro is expanded in. The
/// `REPO_VERSION`, `BUILD_PROFILE`, `BUILD_FEATURES` and `BUILD_TIMESTAMP`
/// variables come from that crate's build script, when it has one.
#[macro_export]
macro_rules! build_info {
    () => {
        $crate::version::BuildInfo::new(
            env!("CARGO_PKG_VERSION"),
            option_env!("REPO_VERSION"),
            option_env!("BUILD_PROFILE"),
            option_env!("BUILD_FEATURES"),
            option_env!("BUILD_TIMESTAMP"),
        )
    };
}

pub fn build_info() -> BuildInfo {
    crate::build_info!()
}
