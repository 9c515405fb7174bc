use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};
use std::path::Path;
use std::process::{Command, ExitStatus};

use anyhow::Context as _;

use crate::meta::Target;

pub fn rustflags<S: AsRef<str>>(link_libs: &[S], max_page_size: u64, extra: &[String]) -> String {
    link_libs
        .iter()
        .map(|lib| format!("-Clink-arg=-l{}", lib.as_ref()))
        .chain(std::iter::once(format!(
            "-Clink-arg=-Wl,-z,max-page-size={max_page_size}"
        )))
        .chain(extra.iter().cloned())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Variables exported to the build tool, on top of the inherited environment.
pub fn build_env(
    ndk_home: &Path,
    rustflags: &str,
    extra: &BTreeMap<String, String>,
) -> BTreeMap<String, OsString> {
    let mut env = BTreeMap::new();
    env.insert("ANDROID_NDK_HOME".to_string(), ndk_home.as_os_str().to_owned());
    env.insert("RUSTFLAGS".to_string(), OsString::from(rustflags));
    for (k, v) in extra {
        env.insert(k.clone(), OsString::from(v));
    }
    env
}

/// The program cargo-ndk is reached through: the cargo that launched us, if any.
pub fn default_program() -> OsString {
    std::env::var_os("CARGO").unwrap_or_else(|| "cargo".into())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: OsString,
    pub args: Vec<OsString>,
    pub env: BTreeMap<String, OsString>,
}

/// Everything that shapes the `cargo ndk` command line.
#[derive(Debug, Clone)]
pub struct BuildRequest<'a> {
    pub program: OsString,
    pub targets: &'a [Target],
    pub platform: Option<u8>,
    pub manifest_path: Option<&'a Path>,
    pub output_dir: &'a Path,
    pub cargo_args: &'a [String],
    pub env: BTreeMap<String, OsString>,
}

impl Invocation {
    pub fn ndk_build(req: BuildRequest<'_>) -> Self {
        let mut args: Vec<OsString> = vec!["ndk".into()];
        for target in req.targets {
            args.push("-t".into());
            args.push(target.to_string().into());
        }
        if let Some(platform) = req.platform {
            args.push("-P".into());
            args.push(platform.to_string().into());
        }
        if let Some(manifest_path) = req.manifest_path {
            args.push("--manifest-path".into());
            args.push(manifest_path.as_os_str().to_owned());
        }
        args.push("-o".into());
        args.push(req.output_dir.as_os_str().to_owned());
        args.push("build".into());
        args.extend(req.cargo_args.iter().map(OsString::from));

        Invocation {
            program: req.program,
            args,
            env: req.env,
        }
    }

    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).envs(&self.env);
        cmd
    }

    /// One-line rendering for logs; quoting is for readability only.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_os_str())
            .chain(self.args.iter().map(OsString::as_os_str))
            .map(quote)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// POSIX shell quoting; arguments made only of safe characters stay bare.
pub(crate) fn quote(arg: &OsStr) -> String {
    let s = arg.to_string_lossy();
    if !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=,+:@%".contains(c))
    {
        s.into_owned()
    } else {
        format!("'{}'", s.replace('\'', r"'\''"))
    }
}

pub fn run(invocation: &Invocation) -> anyhow::Result<ExitStatus> {
    invocation.command().status().with_context(|| {
        format!(
            "failed to run `{}`",
            Path::new(&invocation.program).display()
        )
    })
}

/// The exit code to hand back to our caller for the tool's status.
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt as _;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    1
}
