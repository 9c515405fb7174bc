fn main() {
    println!("cargo:rerun-if-env-changed=CARGO_JNILIBS_ON_ANDROID");

    if std::env::var("CARGO_JNILIBS_ON_ANDROID").is_ok() {
        println!("cargo:rustc-cfg=cargo_jnilibs_on_android");
    }

    println!("cargo:rustc-check-cfg=cfg(cargo_jnilibs_on_android)");
}
