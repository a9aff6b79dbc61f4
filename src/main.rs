use clap::Parser;
use std::process::ExitCode;
use taxi_ingest::{config::Config, pipeline};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

fn init_tracing(json: bool) {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt::Subscriber::builder().with_env_filter(env);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // ─── 1) parse flags + init logging ───────────────────────────────
    let config = Config::parse();
    init_tracing(config.json_log);
    std::panic::set_hook(Box::new(|info| {
        error!(%info, "panic");
    }));
    info!(
        year = config.year,
        month = config.month,
        table = %config.db.target_table,
        batch_size = config.source.batch_size,
        "startup"
    );

    // ─── 2) connect, stream, load ────────────────────────────────────
    let outcome = match pipeline::run(&config).await {
        Ok(outcome) => outcome,
        Err(err) => {
            error!("{err}");
            return ExitCode::FAILURE;
        }
    };

    // ─── 3) exit status ──────────────────────────────────────────────
    if config.strict && !outcome.is_loaded() {
        warn!(?outcome, "run did not load the full source (--strict)");
        return ExitCode::from(2);
    }
    ExitCode::SUCCESS
}
