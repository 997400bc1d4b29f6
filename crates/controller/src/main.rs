//! kal-jam - Main Entry Point

use std::process::ExitCode;

use anyhow::Context;
use controller::{init_logging, run, LogFormat, Settings, SurveyOrchestrator};
use tracing::{error, info};

async fn try_main(settings: Settings) -> anyhow::Result<u8> {
    let orchestrator = Box::new(SurveyOrchestrator::from_settings(&settings));
    let code = run(settings, orchestrator)
        .await
        .context("controller run aborted")?;
    Ok(code)
}

#[tokio::main]
async fn main() -> ExitCode {
    let settings = match Settings::load().and_then(Settings::validate) {
        Ok(settings) => settings,
        Err(e) => {
            init_logging("info", LogFormat::Pretty);
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    init_logging(&settings.log_level, settings.log_format);

    info!("=== KalJam v{} ===", env!("CARGO_PKG_VERSION"));

    match try_main(settings).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
