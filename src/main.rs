mod cli;
mod ui;

use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::Parser;
use serde::Deserialize;
use tokio::time::sleep;

use cli::{Cli, Command};
use relay::{BatchRequest, JobStatus, RelayClient, RelayConfig, logging};

/// `[[requests]]` table layout for TOML request files.
#[derive(Debug, Deserialize)]
struct RequestFile {
    requests: Vec<BatchRequest>,
}

fn load_requests(path: &Path) -> Result<Vec<BatchRequest>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let requests = match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => {
            toml::from_str::<RequestFile>(&contents)
                .with_context(|| format!("invalid request file {}", path.display()))?
                .requests
        }
        _ => serde_json::from_str::<Vec<BatchRequest>>(&contents)
            .with_context(|| format!("invalid request file {}", path.display()))?,
    };
    Ok(requests)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let mut config = RelayConfig::load_from(&cli.config)?;
    if let Some(root) = cli.root {
        config.root_dir = root;
    }
    let client = RelayClient::from_config(&config)?;

    match cli.command {
        Command::Submit {
            file,
            job_id,
            provider,
            description,
        } => {
            let requests = load_requests(&file)?;
            let job = client
                .submit_batch(&requests, job_id.as_deref(), &provider, description.as_deref())
                .await?;
            println!("Job submitted:");
            ui::print_job(&job);
        }
        Command::List => {
            let ids = client.list_jobs()?;
            println!(
                "Found {} saved job(s) under {}:",
                ids.len(),
                client.store().root().display()
            );
            for id in ids {
                match client.get_job(&id) {
                    Ok(job) => ui::print_job_line(&job),
                    Err(e) => println!("  - {id:<32} unreadable: {e}"),
                }
            }
        }
        Command::Status { job_id, wait } => {
            let job = if wait {
                wait_for_terminal(&client, &job_id, &config).await?
            } else {
                client.monitor_batch(&job_id).await?
            };
            ui::print_job(&job);
            if !job.is_terminal() {
                println!("\nCheck again later with: relay status {job_id}");
            }
        }
        Command::Results { job_id, output } => {
            let results = client.retrieve_batch_results(&job_id).await?;
            let json = serde_json::to_string_pretty(&results)?;
            match output {
                Some(path) => std::fs::write(&path, json)
                    .with_context(|| format!("failed to write {}", path.display()))?,
                None => println!("{json}"),
            }
            ui::print_results_summary(&results);
        }
    }

    Ok(())
}

/// Polls until the job is terminal or `max_wait_secs` elapses.
async fn wait_for_terminal(
    client: &RelayClient,
    job_id: &str,
    config: &RelayConfig,
) -> Result<relay::BatchJob> {
    let interval = Duration::from_secs(config.poll_interval_secs.max(1));
    let max_wait = Duration::from_secs(config.max_wait_secs);
    let started = Instant::now();
    let progress = ui::WaitProgress::start(job_id);

    let job = loop {
        let job = client.monitor_batch(job_id).await?;
        progress.update(&job);

        if job.is_terminal() {
            break job;
        }
        if job.status == JobStatus::Created {
            progress.finish();
            bail!("job {job_id} was never confirmed by its provider");
        }
        if started.elapsed() >= max_wait {
            progress.note(&format!(
                "maximum wait time ({}s) exceeded",
                config.max_wait_secs
            ));
            break job;
        }
        sleep(interval).await;
    };

    progress.finish();
    Ok(job)
}
