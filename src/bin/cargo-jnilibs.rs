fn main() -> anyhow::Result<()> {
    let args = std::env::args().collect::<Vec<_>>();

    cargo_jnilibs::cli::run(args)
}
