use clap::Parser;
use hsmgen::Cli;

fn main() {
    // Parser warnings are reported unless `RUST_LOG` says otherwise
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    if let Err(err) = cli.run() {
        eprintln!("ERROR: {err:#}");
        std::process::exit(1);
    }
}
