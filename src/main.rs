//! This program benchmarks THOR on GCE instances and collects the results. Which routine is chosen
//! by passing different command line arguments.

// Useful common routines
#[macro_use]
mod common;

// Adapters for the `gcloud` and `gsutil` CLIs.
mod gcloud;
mod storage;

// Routines
mod analyze;
mod bench;

fn run() -> Result<(), failure::Error> {
    let matches = clap::App::new("thor-bench")
        .about(
            "This program benchmarks THOR on GCE instances and collects the results. Which \
             routine is chosen by passing different command line arguments.",
        )
        .subcommand(bench::cli_options())
        .subcommand(analyze::cli_options())
        .setting(clap::AppSettings::SubcommandRequired)
        .setting(clap::AppSettings::DisableVersion)
        .get_matches();

    match matches.subcommand() {
        ("bench", Some(sub_m)) => bench::run(sub_m),
        ("analyze", Some(sub_m)) => analyze::run(sub_m),

        _ => {
            unreachable!();
        }
    }
}

fn main() {
    use console::style;

    // Progress is reported at `info`, so show it unless told otherwise.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // If an error occurred, try to print something helpful.
    if let Err(err) = run() {
        const MESSAGE: &str =
r#"== ERROR ==================================================================================
`thor-bench` encountered an error. The log above may offer clues. If the error pertains to SSH,
you may be able to get useful information by setting the RUST_LOG=debug environment variable."#;

        eprintln!("{}", style(MESSAGE).red().bold());

        // Errors from SSH commands
        if err.downcast_ref::<spurs::SshError>().is_some() {
            eprintln!("An error occurred while attempting to run a command over SSH");
        }

        eprintln!("`thor-bench` encountered the following error:\n{}", err);

        std::process::exit(101);
    }
}
