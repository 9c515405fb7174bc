use std::collections::BTreeMap;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context as _, bail};
use clap::ValueEnum;
use clap::builder::PossibleValue;
use serde::Deserialize;

pub fn default_targets() -> &'static [Target] {
    &[Target::Arm64V8a]
}

#[derive(Debug, Deserialize, Copy, Clone, PartialEq, Eq)]
pub enum Target {
    #[serde(rename = "armeabi-v7a", alias = "armv7-linux-androideabi")]
    ArmeabiV7a,
    #[serde(rename = "arm64-v8a", alias = "aarch64-linux-android")]
    Arm64V8a,
    #[serde(rename = "x86", alias = "i686-linux-android")]
    X86,
    #[serde(rename = "x86_64", alias = "x86_64-linux-android")]
    X86_64,
}

impl ValueEnum for Target {
    fn value_variants<'a>() -> &'a [Self] {
        &[Self::ArmeabiV7a, Self::Arm64V8a, Self::X86, Self::X86_64]
    }

    fn to_possible_value(&self) -> Option<PossibleValue> {
        Some(match self {
            Self::ArmeabiV7a => PossibleValue::new("armeabi-v7a").alias("armv7-linux-androideabi"),
            Self::Arm64V8a => PossibleValue::new("arm64-v8a").alias("aarch64-linux-android"),
            Self::X86 => PossibleValue::new("x86").alias("i686-linux-android"),
            Self::X86_64 => PossibleValue::new("x86_64").alias("x86_64-linux-android"),
        })
    }
}

impl FromStr for Target {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            // android ABI names
            "armeabi-v7a" => Target::ArmeabiV7a,
            "arm64-v8a" => Target::Arm64V8a,
            "x86" => Target::X86,
            "x86_64" => Target::X86_64,
            // rust triples
            "armv7-linux-androideabi" => Target::ArmeabiV7a,
            "aarch64-linux-android" => Target::Arm64V8a,
            "i686-linux-android" => Target::X86,
            "x86_64-linux-android" => Target::X86_64,
            _ => return Err(format!("Unsupported target: '{s}'")),
        })
    }
}

impl Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Target::ArmeabiV7a => "armeabi-v7a",
            Target::Arm64V8a => "arm64-v8a",
            Target::X86 => "x86",
            Target::X86_64 => "x86_64",
        })
    }
}

impl Target {
    pub fn triple(&self) -> &'static str {
        match self {
            Target::ArmeabiV7a => "armv7-linux-androideabi",
            Target::Arm64V8a => "aarch64-linux-android",
            Target::X86 => "i686-linux-android",
            Target::X86_64 => "x86_64-linux-android",
        }
    }
}

/// Settings from `[package.metadata.jnilibs]`.
#[derive(Debug, Default, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Config {
    pub ndk_home: Option<PathBuf>,
    pub targets: Option<Vec<Target>>,
    pub output_dir: Option<PathBuf>,
    pub platform: Option<u8>,
    pub link_libs: Option<Vec<String>>,
    pub max_page_size: Option<u64>,
    #[serde(default)]
    pub rustflags: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct Manifest {
    package: Option<Package>,
}

#[derive(Debug, Deserialize)]
struct Package {
    metadata: Option<PackageMetadata>,
}

#[derive(Debug, Deserialize)]
struct PackageMetadata {
    jnilibs: Option<Config>,
}

/// Reads the jnilibs table from a manifest. A manifest that does not exist
/// yields the defaults, so the tool also works outside a crate directory.
pub fn config(cargo_toml_path: &Path) -> anyhow::Result<Config> {
    if !cargo_toml_path.exists() {
        return Ok(Config::default());
    }

    let toml_string = std::fs::read_to_string(cargo_toml_path)
        .with_context(|| format!("failed to read {}", cargo_toml_path.display()))?;
    let config = parse_config(&toml_string)
        .with_context(|| format!("failed to parse {}", cargo_toml_path.display()))?;

    if let Some(size) = config.max_page_size {
        validate_max_page_size(size)?;
    }
    if let Some(libs) = config.link_libs.as_deref() {
        for lib in libs {
            validate_link_lib(lib)?;
        }
    }

    Ok(config)
}

fn parse_config(toml_string: &str) -> anyhow::Result<Config> {
    let manifest: Manifest = toml::from_str(toml_string)?;
    Ok(manifest
        .package
        .and_then(|p| p.metadata)
        .and_then(|m| m.jnilibs)
        .unwrap_or_default())
}

pub fn validate_max_page_size(size: u64) -> anyhow::Result<u64> {
    if size < 4096 || !size.is_power_of_two() {
        bail!("max-page-size must be a power of two of at least 4096, got {size}");
    }
    Ok(size)
}

pub fn validate_link_lib(name: &str) -> anyhow::Result<()> {
    if name.is_empty() {
        bail!("link library names must not be empty");
    }
    if name.chars().any(char::is_whitespace) {
        bail!("link library name '{name}' contains whitespace");
    }
    Ok(())
}

/// Where a resolved setting came from; shown at `-vv`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    CommandLine,
    Manifest,
    Default,
}

impl Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Source::CommandLine => "command line",
            Source::Manifest => "Cargo.toml",
            Source::Default => "default",
        })
    }
}

/// Picks the command line value, then the manifest value, then `default`.
pub fn pick<T>(cli: Option<T>, manifest: Option<T>, default: impl FnOnce() -> T) -> (T, Source) {
    match (cli, manifest) {
        (Some(v), _) => (v, Source::CommandLine),
        (None, Some(v)) => (v, Source::Manifest),
        (None, None) => (default(), Source::Default),
    }
}
