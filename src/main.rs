use std::error::Error;
use std::io;
use std::process::ExitCode;

use clap::Parser;
use web_archiver::cli::{self, Args, NO_ADDON_EXIT_CODE};
use web_archiver::{Host, HostError};

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    match run(args).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err}");
            let mut source = err.source();
            while let Some(cause) = source {
                eprintln!("  caused by: {cause}");
                source = cause.source();
            }
            ExitCode::from(cli::exit_status_for(&err))
        }
    }
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp_millis()
        .init();
}

async fn run(args: Args) -> Result<ExitCode, HostError> {
    let mut host = Host::builder().with_config(args.host_config()).build()?;

    let name = match args.addon {
        Some(name) => name,
        None => {
            let stdin = io::stdin();
            match cli::resolve_addon(&host, &mut stdin.lock(), &mut io::stdout()) {
                Some(name) => name,
                None => return Ok(ExitCode::from(NO_ADDON_EXIT_CODE)),
            }
        }
    };

    let token = host.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("interrupt received, cancelling run");
            token.cancel();
        }
    });

    let report = host.run(&name).await?;
    log::info!(
        "{} finished in {:.2}s ({} cookie(s) loaded)",
        report.addon,
        report.elapsed.as_secs_f64(),
        report.cookies_loaded
    );
    Ok(ExitCode::SUCCESS)
}
