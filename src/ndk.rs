use std::{
    ffi::OsString,
    fmt::Display,
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use cargo_metadata::semver::Version;

use crate::shell::Shell;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NdkDetectionMethod {
    CommandLine,
    Manifest,
    EnvVar(&'static str),
    SdkEnvVar(&'static str),
    AndroidStudio,
}

impl Display for NdkDetectionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NdkDetectionMethod::CommandLine => f.write_str("--ndk-home"),
            NdkDetectionMethod::Manifest => f.write_str("Cargo.toml"),
            NdkDetectionMethod::EnvVar(name) => write!(f, "${name}"),
            NdkDetectionMethod::SdkEnvVar(name) => write!(f, "${name}/ndk"),
            NdkDetectionMethod::AndroidStudio => f.write_str("Android Studio default SDK"),
        }
    }
}

pub fn highest_version_ndk_in_path(ndk_dir: &Path) -> Option<PathBuf> {
    if !ndk_dir.is_dir() {
        return None;
    }

    std::fs::read_dir(ndk_dir)
        .ok()?
        .flat_map(Result::ok)
        .filter_map(|x| {
            let path = x.path();
            path.file_name()
                .and_then(|name| name.to_str())
                .and_then(|name| Version::parse(name).ok())
                .map(|version| (version, path))
        })
        .max_by(|(a, _), (b, _)| a.cmp(b))
        .map(|(_, path)| path)
}

fn android_studio_sdk_dir() -> Option<PathBuf> {
    #[cfg(windows)]
    let sdk = pathos::user::local_dir().ok()?.join("Android").join("Sdk");
    #[cfg(target_os = "macos")]
    let sdk = pathos::user::home_dir()
        .ok()?
        .join("Library")
        .join("Android")
        .join("sdk");
    #[cfg(not(any(windows, target_os = "macos")))]
    let sdk = pathos::xdg::home_dir().ok()?.join("Android").join("Sdk");

    Some(sdk)
}

/// Finds an NDK from the environment, then the Android Studio install.
pub fn derive_ndk_path(shell: &mut Shell) -> Option<(PathBuf, NdkDetectionMethod)> {
    let found = derive_ndk_path_from(|key| std::env::var_os(key), android_studio_sdk_dir());
    if let Some((path, method)) = &found {
        let _ = shell.very_verbose(|shell| {
            shell.status("Found", format!("NDK at {} (via {method})", path.display()))
        });
    }
    found
}

pub(crate) fn derive_ndk_path_from(
    var: impl Fn(&str) -> Option<OsString>,
    studio_sdk: Option<PathBuf>,
) -> Option<(PathBuf, NdkDetectionMethod)> {
    if let Some(path) = var("ANDROID_NDK_ROOT") {
        return Some((PathBuf::from(path), NdkDetectionMethod::EnvVar("ANDROID_NDK_ROOT")));
    }

    // These commonly point either at one NDK or at a directory of versions.
    for key in ["ANDROID_NDK_HOME", "NDK_HOME"] {
        if let Some(path) = var(key) {
            let path = PathBuf::from(path);
            let path = highest_version_ndk_in_path(&path).unwrap_or(path);
            return Some((path, NdkDetectionMethod::EnvVar(key)));
        }
    }

    for key in ["ANDROID_SDK_ROOT", "ANDROID_HOME", "ANDROID_SDK_HOME"] {
        if let Some(sdk_path) = var(key) {
            let ndk_dir = PathBuf::from(sdk_path).join("ndk");
            if let Some(path) = highest_version_ndk_in_path(&ndk_dir) {
                return Some((path, NdkDetectionMethod::SdkEnvVar(key)));
            }
        }
    }

    let ndk_dir = studio_sdk?.join("ndk");
    highest_version_ndk_in_path(&ndk_dir).map(|path| (path, NdkDetectionMethod::AndroidStudio))
}

/// Reads `Pkg.Revision` from the NDK's `source.properties`.
pub fn derive_ndk_version(path: &Path) -> anyhow::Result<Version> {
    let props_path = path.join("source.properties");
    let data = std::fs::read_to_string(&props_path)
        .with_context(|| format!("failed to read {}", props_path.display()))?;
    parse_pkg_revision(&data)
        .with_context(|| format!("no valid Pkg.Revision in {}", props_path.display()))
}

fn parse_pkg_revision(source_properties: &str) -> Option<Version> {
    source_properties.lines().find_map(|line| {
        let (key, value) = line.split_once('=')?;
        if key.trim() != "Pkg.Revision" {
            return None;
        }
        Version::parse(value.trim()).ok()
    })
}
