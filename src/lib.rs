pub mod artifacts;
pub mod cargo;
pub mod cli;
pub mod meta;
pub mod ndk;
pub mod shell;

#[cfg(all(target_os = "android", not(cargo_jnilibs_on_android)))]
compile_error!(
    r#"
Building cargo-jnilibs on Android is not supported. This binary is intended to be run on your host OS.

Set CARGO_JNILIBS_ON_ANDROID to override this check (for example, building for Termux)."
"#
);

/// Page size the linker aligns segments to unless configured otherwise.
///
/// Android 15 devices may run with 16 KiB pages; libraries aligned to 4 KiB
/// fail to load there.
pub const DEFAULT_MAX_PAGE_SIZE: u64 = 16384;

/// Libraries linked into every build unless configured otherwise.
pub const DEFAULT_LINK_LIBS: &[&str] = &["c++_shared", "m", "dl"];

/// Where `cargo ndk -o` places libraries, relative to the Rust crate inside an
/// Android module (`app/rs` next to `app/src`).
pub const DEFAULT_OUTPUT_DIR: &str = "../src/main/jniLibs";
