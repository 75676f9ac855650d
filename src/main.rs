use anyhow::Context;
use clap::Parser;
use kws_pipeline::{
    cli::Cli,
    config::Config,
    error::KwsError,
    pipeline::{Pipeline, StageOutcome},
};
use std::process::ExitCode;

fn main() -> ExitCode {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        // --help and --version
        Err(e) if !e.use_stderr() => {
            let _ = e.print();
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            let err = KwsError::from(e);
            eprintln!("❌ {}", err);
            return ExitCode::from(err.exit_code());
        }
    };

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("❌ {:#}", e);
            let code = e
                .downcast_ref::<KwsError>()
                .map(KwsError::exit_code)
                .unwrap_or(1);
            ExitCode::from(code)
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    config.log_summary();

    let mut pipeline = Pipeline::with_defaults(&config);
    let outcome = pipeline
        .run(cli.stage)
        .with_context(|| format!("{} stage failed", cli.stage))?;

    match outcome {
        StageOutcome::Trained => log::info!("✅ Training finished"),
        StageOutcome::Frozen(model) => {
            log::info!("✅ Frozen model written to {}", model.dir().display())
        }
        StageOutcome::Exported { path, size_bytes } => {
            log::info!("✅ C source written to {} ({} bytes)", path.display(), size_bytes);
        }
        StageOutcome::Evaluated { results, .. } => {
            log::info!("✅ Evaluated {} artifacts", results.len());
        }
    }
    Ok(())
}
