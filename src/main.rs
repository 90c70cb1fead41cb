use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use daytrade_content::cli::{CliOptions, Command, days};
use daytrade_content::config::setup_logging;
use daytrade_content::constants::RUN_TIMEOUT;
use daytrade_content::persist::sweep_older_than;
use daytrade_content::pipeline::Pipeline;
use daytrade_content::scheduler::{ScheduleOptions, run_once_logged, run_scheduler};
use tracing::{error, info};

#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    let cli = CliOptions::parse();

    if setup_logging(cli.debug).is_err() {
        return ExitCode::FAILURE;
    }

    if let Command::Sweep { max_age_days } = cli.command {
        let output_dir = &cli.pipeline.output_dir;
        return match sweep_older_than(output_dir, days(max_age_days)).await {
            Ok(removed) => {
                info!("Removed {} file(s) from {}", removed.len(), output_dir.display());
                ExitCode::SUCCESS
            }
            Err(err) => {
                error!("Retention sweep failed: {}", err);
                ExitCode::FAILURE
            }
        };
    }

    let pipeline = match cli.pipeline.to_config().and_then(Pipeline::new) {
        Ok(pipeline) => Arc::new(pipeline),
        Err(err) => {
            error!("Invalid pipeline configuration: {}", err);
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Command::Run => {
            if run_once_logged(pipeline, RUN_TIMEOUT).await {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Command::Schedule {
            interval_secs,
            run_timeout_secs,
            max_age_days,
        } => {
            let options = ScheduleOptions {
                interval: Duration::from_secs(interval_secs.max(1)),
                run_timeout: Duration::from_secs(run_timeout_secs),
                retention: days(max_age_days),
                ..ScheduleOptions::default()
            };
            if let Err(err) = run_scheduler(pipeline, options).await {
                error!("Scheduler error: {}", err);
                return ExitCode::FAILURE;
            }
            ExitCode::SUCCESS
        }
        Command::Serve {
            port,
            listen_address,
            webhook_secret,
            run_timeout_secs,
        } => {
            if let Err(err) = daytrade_content::web::setup_server(
                &listen_address,
                port,
                pipeline,
                webhook_secret,
                Duration::from_secs(run_timeout_secs),
            )
            .await
            {
                error!("Application error: {}", err);
                return ExitCode::FAILURE;
            }
            ExitCode::SUCCESS
        }
        Command::Sweep { .. } => ExitCode::SUCCESS,
    }
}
