use std::{
    collections::BTreeMap,
    ffi::OsString,
    fmt::Display,
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use clap::{ArgAction, Parser};
use filetime::FileTime;

use crate::{
    DEFAULT_LINK_LIBS, DEFAULT_MAX_PAGE_SIZE, DEFAULT_OUTPUT_DIR,
    cargo::{BuildRequest, Invocation, build_env, default_program, exit_code, rustflags},
    meta::{self, Config, Source, Target, default_targets, pick},
    ndk::{NdkDetectionMethod, derive_ndk_path, derive_ndk_version},
    shell::{Shell, Verbosity},
};

pub mod env;

#[derive(Debug, Parser)]
#[command(
    name = "cargo-jnilibs",
    bin_name = "cargo jnilibs",
    version,
    about = "Builds a Rust library with cargo-ndk into an Android jniLibs directory",
    after_help = "Arguments after the options are passed unchanged to `cargo ndk ... build`."
)]
struct BuildArgs {
    /// Android ABI or Rust triple to build for. Repeatable [default: arm64-v8a]
    #[arg(
        short,
        long = "target",
        value_name = "TARGET",
        env = "CARGO_JNILIBS_TARGET",
        value_delimiter = ','
    )]
    targets: Vec<Target>,

    /// jniLibs directory that receives <abi>/lib*.so [default: ../src/main/jniLibs]
    #[arg(short, long, value_name = "DIR", env = "CARGO_JNILIBS_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Platform (also known as API level)
    #[arg(short = 'P', long, env = "CARGO_JNILIBS_PLATFORM")]
    platform: Option<u8>,

    /// Root of the NDK installation, exported as ANDROID_NDK_HOME
    #[arg(long, value_name = "PATH", env = "CARGO_JNILIBS_NDK_HOME")]
    ndk_home: Option<PathBuf>,

    /// Library to link; replaces the defaults (c++_shared, m, dl). Repeatable
    #[arg(long = "link-lib", value_name = "NAME")]
    link_libs: Vec<String>,

    /// Maximum page size passed to the linker [default: 16384]
    #[arg(long, value_name = "BYTES", env = "CARGO_JNILIBS_MAX_PAGE_SIZE")]
    max_page_size: Option<u64>,

    /// Path to Cargo.toml; read for configuration and passed to cargo-ndk
    #[arg(long, value_name = "PATH")]
    manifest_path: Option<PathBuf>,

    /// Program used to run `ndk` [default: $CARGO or cargo]
    #[arg(long, value_name = "PATH", env = "CARGO_JNILIBS_CARGO")]
    cargo: Option<PathBuf>,

    /// Print the environment and command instead of running it
    #[arg(long)]
    dry_run: bool,

    /// Use verbose output (-vv very verbose)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Print only errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Coloring: auto, always, never
    #[arg(long, value_name = "WHEN")]
    color: Option<String>,

    /// Arguments passed to `cargo ndk ... build`
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    cargo_args: Vec<String>,
}

/// Drops the subcommand name cargo inserts when we run as `cargo jnilibs`.
pub(crate) fn strip_cargo_subcommand(mut args: Vec<String>, name: &str) -> Vec<String> {
    if args.get(1).map(String::as_str) == Some(name) {
        args.remove(1);
    }
    args
}

pub(crate) fn verbosity(verbose: u8, quiet: bool) -> Verbosity {
    match (quiet, verbose) {
        (true, _) => Verbosity::Quiet,
        (false, 0) => Verbosity::Normal,
        (false, 1) => Verbosity::Verbose,
        (false, _) => Verbosity::VeryVerbose,
    }
}

fn init_shell(verbose: u8, quiet: bool, color: Option<&str>) -> Shell {
    let mut shell = Shell::new();
    shell.set_verbosity(verbosity(verbose, quiet));
    if let Err(e) = shell.set_color_choice(color) {
        let _ = shell.error(e);
        std::process::exit(1);
    }
    shell
}

/// No NDK could be resolved from any source.
#[derive(Debug)]
pub struct NoNdkFound;

impl Display for NoNdkFound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Could not find any NDK.")
    }
}

impl std::error::Error for NoNdkFound {}

/// Relative paths in Cargo.toml are relative to the manifest.
fn manifest_relative(manifest_path: &Path, path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        return path;
    }
    match manifest_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.join(path),
        _ => path,
    }
}

pub(crate) fn manifest_path_or_default(manifest_path: Option<&Path>) -> anyhow::Result<PathBuf> {
    match manifest_path {
        Some(path) => Ok(path.to_path_buf()),
        None => Ok(std::env::current_dir()
            .context("current directory could not be resolved")?
            .join("Cargo.toml")),
    }
}

/// Environment settings shared by the build and env commands.
#[derive(Debug)]
pub(crate) struct EnvSettings {
    pub ndk_home: PathBuf,
    pub ndk_method: NdkDetectionMethod,
    pub env: BTreeMap<String, OsString>,
    pub sources: Vec<(&'static str, Source)>,
}

pub(crate) fn resolve_env(
    ndk_home: Option<PathBuf>,
    link_libs: Vec<String>,
    max_page_size: Option<u64>,
    manifest_path: &Path,
    config: &Config,
    discover: impl FnOnce() -> Option<(PathBuf, NdkDetectionMethod)>,
) -> anyhow::Result<EnvSettings> {
    let (ndk_home, ndk_method) = match (ndk_home, config.ndk_home.clone()) {
        (Some(path), _) => (path, NdkDetectionMethod::CommandLine),
        (None, Some(path)) => (
            manifest_relative(manifest_path, path),
            NdkDetectionMethod::Manifest,
        ),
        (None, None) => discover().ok_or(NoNdkFound)?,
    };
    // Keep the path as given when it does not exist; the build tool reports that.
    let ndk_home = dunce::canonicalize(&ndk_home).unwrap_or(ndk_home);

    let cli_libs = (!link_libs.is_empty()).then_some(link_libs);
    if let Some(libs) = cli_libs.as_deref() {
        for lib in libs {
            meta::validate_link_lib(lib)?;
        }
    }
    let (link_libs, libs_source) = pick(cli_libs, config.link_libs.clone(), || {
        DEFAULT_LINK_LIBS.iter().map(|s| s.to_string()).collect()
    });

    if let Some(size) = max_page_size {
        meta::validate_max_page_size(size)?;
    }
    let (max_page_size, page_source) =
        pick(max_page_size, config.max_page_size, || DEFAULT_MAX_PAGE_SIZE);

    let flags = rustflags(link_libs.as_slice(), max_page_size, &config.rustflags);
    let env = build_env(&ndk_home, &flags, &config.env);

    Ok(EnvSettings {
        ndk_home,
        ndk_method,
        env,
        sources: vec![("link-libs", libs_source), ("max-page-size", page_source)],
    })
}

/// A fully resolved build, ready to spawn.
#[derive(Debug)]
pub(crate) struct Plan {
    pub invocation: Invocation,
    pub targets: Vec<Target>,
    pub output_dir: PathBuf,
    pub settings: EnvSettings,
}

fn plan(
    args: BuildArgs,
    manifest_path: &Path,
    config: &Config,
    discover: impl FnOnce() -> Option<(PathBuf, NdkDetectionMethod)>,
) -> anyhow::Result<Plan> {
    let mut settings = resolve_env(
        args.ndk_home,
        args.link_libs,
        args.max_page_size,
        manifest_path,
        config,
        discover,
    )?;

    let cli_targets = (!args.targets.is_empty()).then_some(args.targets);
    let (targets, targets_source) = pick(cli_targets, config.targets.clone(), || {
        default_targets().to_vec()
    });

    let (output_dir, output_source) = pick(
        args.output_dir,
        config
            .output_dir
            .clone()
            .map(|p| manifest_relative(manifest_path, p)),
        || PathBuf::from(DEFAULT_OUTPUT_DIR),
    );

    let (platform, platform_source) = match (args.platform, config.platform) {
        (Some(p), _) => (Some(p), Source::CommandLine),
        (None, Some(p)) => (Some(p), Source::Manifest),
        (None, None) => (None, Source::Default),
    };

    settings.sources.extend([
        ("targets", targets_source),
        ("output-dir", output_source),
        ("platform", platform_source),
    ]);

    let program = args
        .cargo
        .map(PathBuf::into_os_string)
        .unwrap_or_else(default_program);

    let invocation = Invocation::ndk_build(BuildRequest {
        program,
        targets: &targets,
        platform,
        manifest_path: args.manifest_path.as_deref(),
        output_dir: &output_dir,
        cargo_args: &args.cargo_args,
        env: settings.env.clone(),
    });

    Ok(Plan {
        invocation,
        targets,
        output_dir,
        settings,
    })
}

fn report_no_ndk(shell: &mut Shell) -> anyhow::Result<()> {
    shell.error(NoNdkFound)?;
    shell.note(
        "Pass --ndk-home, set ndk-home in [package.metadata.jnilibs], or set ANDROID_NDK_HOME\nto your NDK installation's root directory, or install the NDK using Android Studio.",
    )?;
    Ok(())
}

/// Reports a failure to resolve settings and exits.
pub(crate) fn fail(shell: &mut Shell, err: anyhow::Error) -> ! {
    if err.downcast_ref::<NoNdkFound>().is_some() {
        let _ = report_no_ndk(shell);
    } else {
        let _ = shell.error(format!("{err:#}"));
    }
    std::process::exit(1)
}

pub(crate) fn show_ndk(shell: &mut Shell, settings: &EnvSettings) -> anyhow::Result<()> {
    if !settings.ndk_home.exists() {
        shell.warn(format!(
            "NDK path {} does not exist",
            settings.ndk_home.display()
        ))?;
        return Ok(());
    }

    match derive_ndk_version(&settings.ndk_home) {
        Ok(version) => shell.verbose(|shell| {
            shell.status_with_color(
                "Detected",
                format!(
                    "NDK v{} ({}) [{}]",
                    version,
                    settings.ndk_home.display(),
                    settings.ndk_method
                ),
                termcolor::Color::Cyan,
            )
        })?,
        Err(e) => shell.verbose(|shell| shell.warn(format!("{e:#}")))?,
    }
    Ok(())
}

pub fn run(args: Vec<String>) -> anyhow::Result<()> {
    let args = strip_cargo_subcommand(args, "jnilibs");
    let args = BuildArgs::try_parse_from(&args).unwrap_or_else(|e| e.exit());

    let mut shell = init_shell(args.verbose, args.quiet, args.color.as_deref());
    let dry_run = args.dry_run;

    let manifest_path = match manifest_path_or_default(args.manifest_path.as_deref()) {
        Ok(v) => v,
        Err(e) => fail(&mut shell, e),
    };
    let config = match meta::config(&manifest_path) {
        Ok(v) => v,
        Err(e) => fail(&mut shell, e),
    };

    let plan = match plan(args, &manifest_path, &config, || derive_ndk_path(&mut shell)) {
        Ok(v) => v,
        Err(e) => fail(&mut shell, e),
    };

    shell.very_verbose(|shell| {
        for (name, source) in &plan.settings.sources {
            shell.status_with_color("Setting", format!("{name} from {source}"), termcolor::Color::Cyan)?;
        }
        Ok(())
    })?;
    show_ndk(&mut shell, &plan.settings)?;
    shell.verbose(|shell| {
        for (k, v) in &plan.invocation.env {
            shell.status_with_color(
                "Exporting",
                format!("{k}={}", v.to_string_lossy()),
                termcolor::Color::Cyan,
            )?;
        }
        shell.status_with_color(
            "Running",
            format!("`{}`", plan.invocation.display()),
            termcolor::Color::Cyan,
        )
    })?;

    if dry_run {
        for (k, v) in &plan.invocation.env {
            println!("{k}={}", v.to_string_lossy());
        }
        println!("{}", plan.invocation.display());
        return Ok(());
    }

    let targets_list = plan
        .targets
        .iter()
        .map(|t| t.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    shell.status(
        "Building",
        format!("{targets_list} into {}", plan.output_dir.display()),
    )?;

    // Filesystem timestamps can be coarser than the clock.
    let now = FileTime::now();
    let since = FileTime::from_unix_time(now.unix_seconds() - 1, now.nanoseconds());

    let status = match crate::cargo::run(&plan.invocation) {
        Ok(status) => status,
        Err(e) => {
            shell.error(format!("{e:#}"))?;
            shell.note("cargo-ndk can be installed with `cargo install cargo-ndk`.")?;
            std::process::exit(1);
        }
    };

    let code = exit_code(status);
    if code != 0 {
        shell.note("If the build failed due to a missing target, you can run:")?;
        for target in &plan.targets {
            shell.note(format!("    rustup target add {}", target.triple()))?;
        }
        std::process::exit(code);
    }

    let produced = crate::artifacts::produced_libraries(&plan.output_dir, &plan.targets, since);
    if produced.is_empty() {
        shell.warn(format!(
            "no new .so files under {}",
            plan.output_dir.display()
        ))?;
        shell.note("Is `crate-type` set to include \"cdylib\" in Cargo.toml?")?;
    }
    for path in produced {
        shell.status("Finished", path.display())?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> BuildArgs {
        BuildArgs::try_parse_from(args).unwrap()
    }

    fn no_ndk() -> Option<(PathBuf, NdkDetectionMethod)> {
        None
    }

    fn plan_for(args: &[&str], config: &Config) -> anyhow::Result<Plan> {
        plan(parse(args), Path::new("app/rs/Cargo.toml"), config, no_ndk)
    }

    fn argv(plan: &Plan) -> Vec<String> {
        plan.invocation
            .args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn cargo_subcommand_name_is_dropped() {
        let args = vec!["cargo-jnilibs".into(), "jnilibs".into(), "--release".into()];
        assert_eq!(
            strip_cargo_subcommand(args, "jnilibs"),
            ["cargo-jnilibs", "--release"]
        );
        let direct = vec!["cargo-jnilibs".into(), "--release".into()];
        assert_eq!(
            strip_cargo_subcommand(direct, "jnilibs"),
            ["cargo-jnilibs", "--release"]
        );
    }

    #[test]
    fn first_unknown_argument_starts_forwarding() {
        let args = parse(&["cargo-jnilibs", "--ndk-home", "/ndk", "--release", "-v", "-o", "x"]);
        assert_eq!(args.cargo_args, ["--release", "-v", "-o", "x"]);
        assert_eq!(args.verbose, 0);
        assert_eq!(args.output_dir, None);
    }

    #[test]
    fn double_dash_forwards_everything() {
        let args = parse(&["cargo-jnilibs", "-v", "--", "--ndk-home", "x"]);
        assert_eq!(args.cargo_args, ["--ndk-home", "x"]);
        assert_eq!(args.verbose, 1);
    }

    #[test]
    fn verbosity_levels() {
        assert_eq!(verbosity(0, false), Verbosity::Normal);
        assert_eq!(verbosity(1, false), Verbosity::Verbose);
        assert_eq!(verbosity(3, false), Verbosity::VeryVerbose);
        assert_eq!(verbosity(0, true), Verbosity::Quiet);
    }

    #[test]
    fn defaults_reproduce_the_plain_build() {
        let plan = plan_for(
            &["cargo-jnilibs", "--ndk-home", "/nonexistent/ndk", "--cargo", "cargo", "--release"],
            &Config::default(),
        )
        .unwrap();

        assert_eq!(
            argv(&plan),
            ["ndk", "-t", "arm64-v8a", "-o", "../src/main/jniLibs", "build", "--release"]
        );
        assert_eq!(
            plan.invocation.env["ANDROID_NDK_HOME"],
            OsString::from("/nonexistent/ndk")
        );
        assert_eq!(
            plan.invocation.env["RUSTFLAGS"],
            OsString::from(
                "-Clink-arg=-lc++_shared -Clink-arg=-lm -Clink-arg=-ldl -Clink-arg=-Wl,-z,max-page-size=16384"
            )
        );
        assert_eq!(plan.invocation.program, OsString::from("cargo"));
    }

    #[test]
    fn manifest_values_apply_below_command_line() {
        let config = Config {
            ndk_home: Some(PathBuf::from("/opt/ndk")),
            targets: Some(vec![Target::X86_64]),
            output_dir: Some(PathBuf::from("jni")),
            platform: Some(26),
            max_page_size: Some(65536),
            ..Config::default()
        };
        let plan = plan_for(&["cargo-jnilibs", "-t", "arm64-v8a"], &config).unwrap();

        assert_eq!(plan.targets, [Target::Arm64V8a]);
        assert_eq!(plan.output_dir, PathBuf::from("app/rs/jni"));
        assert_eq!(plan.settings.ndk_method, NdkDetectionMethod::Manifest);
        assert_eq!(
            argv(&plan),
            ["ndk", "-t", "arm64-v8a", "-P", "26", "-o", "app/rs/jni", "build"]
        );
        assert!(
            plan.invocation.env["RUSTFLAGS"]
                .to_string_lossy()
                .ends_with("max-page-size=65536")
        );
        assert!(
            plan.settings
                .sources
                .contains(&("targets", Source::CommandLine))
        );
        assert!(
            plan.settings
                .sources
                .contains(&("max-page-size", Source::Manifest))
        );
    }

    #[test]
    fn discovery_runs_only_without_explicit_ndk() {
        let found = || Some((PathBuf::from("/found/ndk"), NdkDetectionMethod::AndroidStudio));
        let plan = plan(
            parse(&["cargo-jnilibs"]),
            Path::new("Cargo.toml"),
            &Config::default(),
            found,
        )
        .unwrap();
        assert_eq!(plan.settings.ndk_method, NdkDetectionMethod::AndroidStudio);
        assert_eq!(plan.settings.ndk_home, PathBuf::from("/found/ndk"));
    }

    #[test]
    fn missing_ndk_is_reported() {
        let err = plan_for(&["cargo-jnilibs"], &Config::default()).unwrap_err();
        assert!(err.downcast_ref::<NoNdkFound>().is_some());
    }

    #[test]
    fn command_line_link_libs_replace_defaults() {
        let plan = plan_for(
            &["cargo-jnilibs", "--ndk-home", "/n", "--link-lib", "log", "--link-lib", "android"],
            &Config::default(),
        )
        .unwrap();
        assert_eq!(
            plan.invocation.env["RUSTFLAGS"],
            OsString::from(
                "-Clink-arg=-llog -Clink-arg=-landroid -Clink-arg=-Wl,-z,max-page-size=16384"
            )
        );
    }

    #[test]
    fn invalid_command_line_page_size_is_rejected() {
        let err = plan_for(
            &["cargo-jnilibs", "--ndk-home", "/n", "--max-page-size", "1000"],
            &Config::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("power of two"));
    }

    #[test]
    fn manifest_path_is_forwarded_when_given() {
        let plan = plan_for(
            &["cargo-jnilibs", "--ndk-home", "/n", "--manifest-path", "rs/Cargo.toml"],
            &Config::default(),
        )
        .unwrap();
        let args = argv(&plan);
        let idx = args.iter().position(|a| a == "--manifest-path").unwrap();
        assert_eq!(args[idx + 1], "rs/Cargo.toml");
    }

    #[test]
    fn absolute_manifest_paths_are_kept() {
        let abs = std::env::temp_dir().join("jni");
        assert_eq!(manifest_relative(Path::new("a/Cargo.toml"), abs.clone()), abs);
        assert_eq!(
            manifest_relative(Path::new("Cargo.toml"), PathBuf::from("jni")),
            PathBuf::from("jni")
        );
    }
}
