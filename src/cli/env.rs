use std::{collections::BTreeMap, ffi::OsString, path::PathBuf};

use clap::{ArgAction, Parser};

use crate::{
    cargo::quote,
    cli::{fail, init_shell, manifest_path_or_default, resolve_env, show_ndk, strip_cargo_subcommand},
    meta::{self, Target},
    ndk::derive_ndk_path,
};

#[derive(Debug, Parser)]
#[command(
    name = "cargo-jnilibs-env",
    bin_name = "cargo jnilibs-env",
    version,
    about = "Prints the environment cargo-jnilibs exports to the build"
)]
struct EnvArgs {
    /// Android ABI or Rust triple the environment is meant for
    #[arg(
        short,
        long = "target",
        value_name = "TARGET",
        env = "CARGO_JNILIBS_TARGET",
        value_delimiter = ','
    )]
    targets: Vec<Target>,

    /// Root of the NDK installation
    #[arg(long, value_name = "PATH", env = "CARGO_JNILIBS_NDK_HOME")]
    ndk_home: Option<PathBuf>,

    /// Library to link; replaces the defaults (c++_shared, m, dl). Repeatable
    #[arg(long = "link-lib", value_name = "NAME")]
    link_libs: Vec<String>,

    /// Maximum page size passed to the linker [default: 16384]
    #[arg(long, value_name = "BYTES", env = "CARGO_JNILIBS_MAX_PAGE_SIZE")]
    max_page_size: Option<u64>,

    /// Path to Cargo.toml
    #[arg(long, value_name = "PATH")]
    manifest_path: Option<PathBuf>,

    /// Use PowerShell syntax
    #[arg(long, conflicts_with = "json")]
    powershell: bool,

    /// Print output in JSON format
    #[arg(long)]
    json: bool,

    /// Use verbose output
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Print only errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Coloring: auto, always, never
    #[arg(long, value_name = "WHEN")]
    color: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Syntax {
    Posix,
    PowerShell,
    Json,
}

fn render(env: &BTreeMap<String, OsString>, syntax: Syntax) -> anyhow::Result<String> {
    let mut out = String::new();
    match syntax {
        Syntax::Json => {
            let map = env
                .iter()
                .map(|(k, v)| (k.as_str(), v.to_string_lossy()))
                .collect::<BTreeMap<_, _>>();
            out.push_str(&serde_json::to_string_pretty(&map)?);
            out.push('\n');
        }
        Syntax::PowerShell => {
            for (k, v) in env {
                let v = v.to_string_lossy().replace('\'', "''");
                out.push_str(&format!("${{env:{k}}}='{v}'\n"));
            }
            out.push('\n');
            out.push_str("# To import with PowerShell:\n");
            out.push_str("#     cargo jnilibs-env --powershell | Out-String | Invoke-Expression\n");
        }
        Syntax::Posix => {
            for (k, v) in env {
                out.push_str(&format!("export {k}={}\n", quote(v)));
            }
            out.push('\n');
            out.push_str("# To import with bash/zsh/etc:\n");
            out.push_str("#     source <(cargo jnilibs-env)\n");
        }
    }
    Ok(out)
}

pub fn run(args: Vec<String>) -> anyhow::Result<()> {
    let args = strip_cargo_subcommand(args, "jnilibs-env");
    let args = EnvArgs::try_parse_from(&args).unwrap_or_else(|e| e.exit());

    let mut shell = init_shell(args.verbose, args.quiet, args.color.as_deref());

    let manifest_path = match manifest_path_or_default(args.manifest_path.as_deref()) {
        Ok(v) => v,
        Err(e) => fail(&mut shell, e),
    };
    let config = match meta::config(&manifest_path) {
        Ok(v) => v,
        Err(e) => fail(&mut shell, e),
    };

    let settings = match resolve_env(
        args.ndk_home,
        args.link_libs,
        args.max_page_size,
        &manifest_path,
        &config,
        || derive_ndk_path(&mut shell),
    ) {
        Ok(v) => v,
        Err(e) => fail(&mut shell, e),
    };
    show_ndk(&mut shell, &settings)?;
    shell.verbose(|shell| {
        for target in &args.targets {
            shell.status_with_color(
                "Target",
                format!("{target} ({})", target.triple()),
                termcolor::Color::Cyan,
            )?;
        }
        Ok(())
    })?;

    let syntax = if args.json {
        Syntax::Json
    } else if args.powershell {
        Syntax::PowerShell
    } else {
        Syntax::Posix
    };

    print!("{}", render(&settings.env, syntax)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> BTreeMap<String, OsString> {
        let mut env = BTreeMap::new();
        env.insert("ANDROID_NDK_HOME".to_string(), OsString::from("/opt/ndk"));
        env.insert(
            "RUSTFLAGS".to_string(),
            OsString::from("-Clink-arg=-lm -Clink-arg=-Wl,-z,max-page-size=16384"),
        );
        env
    }

    #[test]
    fn posix_exports_are_quoted() {
        let out = render(&sample(), Syntax::Posix).unwrap();
        assert!(out.starts_with("export ANDROID_NDK_HOME=/opt/ndk\n"));
        assert!(out.contains(
            "export RUSTFLAGS='-Clink-arg=-lm -Clink-arg=-Wl,-z,max-page-size=16384'\n"
        ));
        assert!(out.contains("source <(cargo jnilibs-env)"));
    }

    #[test]
    fn powershell_assignments() {
        let out = render(&sample(), Syntax::PowerShell).unwrap();
        assert!(out.contains("${env:ANDROID_NDK_HOME}='/opt/ndk'\n"));
        assert!(out.contains("Invoke-Expression"));
    }

    #[test]
    fn shell_expansion_characters_are_quoted() {
        let mut env = BTreeMap::new();
        env.insert("CFLAGS".to_string(), OsString::from("-I$HOME/`id`/it's"));

        let posix = render(&env, Syntax::Posix).unwrap();
        assert!(posix.starts_with("export CFLAGS='-I$HOME/`id`/it'\\''s'\n"), "{posix}");

        let powershell = render(&env, Syntax::PowerShell).unwrap();
        assert!(
            powershell.starts_with("${env:CFLAGS}='-I$HOME/`id`/it''s'\n"),
            "{powershell}"
        );
    }

    #[test]
    fn targets_are_accepted() {
        let args = EnvArgs::try_parse_from([
            "cargo-jnilibs-env",
            "--target",
            "arm64-v8a",
            "-t",
            "x86_64-linux-android,armeabi-v7a",
        ])
        .unwrap();
        assert_eq!(
            args.targets,
            [Target::Arm64V8a, Target::X86_64, Target::ArmeabiV7a]
        );
    }

    #[test]
    fn json_object() {
        let out = render(&sample(), Syntax::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["ANDROID_NDK_HOME"], "/opt/ndk");
        assert_eq!(
            value["RUSTFLAGS"],
            "-Clink-arg=-lm -Clink-arg=-Wl,-z,max-page-size=16384"
        );
    }

    #[test]
    fn json_and_powershell_conflict() {
        assert!(
            EnvArgs::try_parse_from(["cargo-jnilibs-env", "--json", "--powershell"]).is_err()
        );
    }
}
