use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use pii_mask_client::config::AppConfig;
use pii_mask_client::models::job::JobId;
use pii_mask_client::services::api::{HttpJobApi, JobApi};
use pii_mask_client::services::upload::UploadFile;
use pii_mask_client::session::{Session, SessionSettings};

#[derive(Parser)]
#[command(name = "pii-mask")]
#[command(about = "Detect and mask PII in identity documents, then review uncertain findings")]
#[command(version)]
struct Cli {
    /// Job system base URL (overrides PII_API_BASE_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Upload a document, wait for detection, export the result and submit a review
    Process {
        /// Image or PDF to scan
        file: PathBuf,

        /// Language hint for text recognition (repeatable)
        #[arg(short, long = "language", default_value = "en")]
        languages: Vec<String>,

        /// Directory for masked_image.* and detections.json (defaults to PII_OUTPUT_DIR)
        #[arg(long)]
        out_dir: Option<PathBuf>,

        /// Pre-recorded decision for a flagged item, e.g. 0=mask or 1=keep (repeatable)
        #[arg(long = "decide", value_parser = parse_decision)]
        decisions: Vec<(usize, bool)>,

        /// Do not prompt for undecided flagged items
        #[arg(long)]
        no_review: bool,
    },
    /// Check the status of an existing job once
    Status {
        job_id: String,
    },
}

/// Parse `INDEX=mask|keep` into `(index, mask)`.
fn parse_decision(raw: &str) -> Result<(usize, bool), String> {
    let (index, choice) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected INDEX=mask|keep, got '{raw}'"))?;
    let index = index
        .trim()
        .parse::<usize>()
        .map_err(|_| format!("invalid flagged index '{index}'"))?;
    let mask = parse_choice(choice).ok_or_else(|| format!("invalid decision '{choice}'"))?;
    Ok((index, mask))
}

fn parse_choice(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "mask" | "m" | "yes" | "y" | "true" => Some(true),
        "keep" | "k" | "no" | "n" | "false" => Some(false),
        _ => None,
    }
}

fn init_metrics(config: &AppConfig) -> anyhow::Result<()> {
    if let Some(addr) = &config.metrics_addr {
        let addr: SocketAddr = addr
            .parse()
            .with_context(|| format!("Invalid PII_METRICS_ADDR '{addr}'"))?;
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("Failed to install Prometheus exporter")?;
        tracing::info!(%addr, "Prometheus metrics listener started");
    }

    metrics::describe_counter!("pii_jobs_submitted_total", "Detection jobs created");
    metrics::describe_counter!("pii_status_checks_total", "Job status checks issued");
    metrics::describe_counter!("pii_jobs_completed_total", "Jobs that reached completed");
    metrics::describe_counter!("pii_jobs_failed_total", "Jobs the engine reported as failed");
    metrics::describe_counter!(
        "pii_review_submissions_total",
        "Review submissions, labelled by outcome"
    );
    metrics::describe_histogram!(
        "pii_job_wait_seconds",
        "Time spent waiting for a job to reach a terminal status"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout stays readable for the operator
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = AppConfig::from_env().context("Failed to load configuration")?;
    if let Some(api_url) = cli.api_url {
        config.api_base_url = api_url;
    }

    init_metrics(&config)?;

    let api = Arc::new(HttpJobApi::new(&config.api_base_url, config.request_timeout())?);

    match cli.command {
        Command::Process {
            file,
            languages,
            out_dir,
            decisions,
            no_review,
        } => {
            let out_dir = out_dir.unwrap_or_else(|| PathBuf::from(&config.output_dir));
            run_process(api, &config, &file, &languages, &out_dir, &decisions, no_review).await
        }
        Command::Status { job_id } => {
            let job_id = JobId::new(job_id);
            let status = api.get_status(&job_id).await?;
            println!("{job_id}: {status}");
            Ok(())
        }
    }
}

async fn run_process(
    api: Arc<HttpJobApi>,
    config: &AppConfig,
    file: &Path,
    languages: &[String],
    out_dir: &Path,
    decisions: &[(usize, bool)],
    no_review: bool,
) -> anyhow::Result<()> {
    let upload = UploadFile::from_path(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let kind = if upload.is_pdf() { "PDF" } else { "image" };
    println!(
        "Uploading {kind} {} ({}, {:.2} MB)",
        upload.file_name,
        upload.content_type,
        upload.size_mb()
    );

    let mut session = Session::new(api, SessionSettings::from(config));
    let job_id = session.start_upload(&upload, languages).await?;
    println!("Job {job_id} created, waiting for detection");

    let result = session.await_result().await?;
    let stats = result.stats();
    let size = match result.dimensions() {
        Some((width, height)) => format!("{width}x{height}"),
        None => "unknown size".to_string(),
    };
    println!(
        "Detections: {} total, {} auto-masked, {} need review, {} types ({size} {:?} image)",
        stats.total,
        stats.auto_masked,
        stats.flagged,
        stats.distinct_types(),
        result.image_format()
    );
    for (pii_type, count) in &stats.per_type {
        println!("  {pii_type:<8} {count}");
    }
    for overlay in result.overlays(true) {
        println!(
            "  [{}] {} at ({:.0}, {:.0}) {:.0}x{:.0}",
            overlay.color, overlay.label, overlay.x, overlay.y, overlay.width, overlay.height
        );
    }

    let image_path = result.export_image(out_dir).await?;
    let json_path = result.export_detections(out_dir).await?;
    println!("Wrote {} and {}", image_path.display(), json_path.display());

    let Some(review) = session.review() else {
        return Ok(());
    };
    if review.is_empty() {
        println!("Nothing flagged for review");
        return Ok(());
    }

    for &(index, mask) in decisions {
        session.record_decision(index, mask)?;
    }

    if !no_review {
        collect_interactively(&mut session).await?;
    }

    let ready = session.review().is_some_and(|review| review.ready_to_submit());
    if !ready {
        let (decided, total) = session.review().map(|r| r.progress()).unwrap_or_default();
        println!("Review left incomplete ({decided} of {total} decided), not submitted");
        return Ok(());
    }

    session.submit_review().await?;
    println!("Review submitted for job {job_id}");
    Ok(())
}

/// Prompt on stdin for every flagged item that still lacks a decision.
async fn collect_interactively<A>(session: &mut Session<A>) -> anyhow::Result<()>
where
    A: JobApi + ?Sized + 'static,
{
    let pending: Vec<(usize, String)> = match session.review() {
        Some(review) => review
            .undecided()
            .map(|index| {
                let item = &review.items()[index];
                let text = item.text.as_deref().unwrap_or("<no text>");
                let prompt = format!(
                    "[{index}] {} \"{text}\" ({}% confidence). Mask? [mask/keep]",
                    item.pii_type,
                    item.confidence_percent()
                );
                (index, prompt)
            })
            .collect(),
        None => return Ok(()),
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    for (index, prompt) in pending {
        loop {
            println!("{prompt}");
            let Some(line) = lines.next_line().await? else {
                return Ok(());
            };
            match parse_choice(&line) {
                Some(mask) => {
                    session.record_decision(index, mask)?;
                    break;
                }
                None => println!("Please answer mask or keep"),
            }
        }
    }
    Ok(())
}
