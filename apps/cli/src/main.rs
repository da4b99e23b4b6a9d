//! SplatScan command-line client entry point.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use splatscan_status::{HttpStatusProber, JobVerdict, ServerState, StatusProber};
use splatscan_transfer::{HttpTransferClient, UploadJob};
use splatscan_uploader::{Outcome, TrainingParams, UploadEvent, UploadOrchestrator, UploadTarget};
use tracing_subscriber::EnvFilter;

use config::Config;

#[derive(Parser)]
#[command(
    name = "splatscan",
    about = "Upload a video to a SplatScan server and wait for the splat job",
    version
)]
struct Cli {
    /// Configuration file to use instead of the default location.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a video and wait for the server to finish processing it
    Upload(UploadArgs),

    /// Probe the server once and print its state
    Status,

    /// Show or set the zrok share the client talks to
    Target(TargetArgs),

    /// Print the configuration file path and contents
    Config,
}

#[derive(Args)]
struct UploadArgs {
    /// Video file to upload.
    video: PathBuf,

    #[arg(long)]
    iterations: Option<String>,

    #[arg(long)]
    keep_pre: Option<String>,

    #[arg(long)]
    keep_post: Option<String>,

    #[arg(long)]
    keep_train_images: Option<String>,

    /// Extra form field sent with the video, as KEY=VALUE.
    #[arg(long = "param", value_name = "KEY=VALUE", value_parser = parse_param)]
    params: Vec<(String, String)>,

    /// Exit once the upload is accepted instead of waiting for the job.
    #[arg(long)]
    no_wait: bool,
}

impl UploadArgs {
    fn training_params(&self) -> TrainingParams {
        TrainingParams {
            iterations: self.iterations.clone(),
            keep_pre: self.keep_pre.clone(),
            keep_post: self.keep_post.clone(),
            keep_train_images: self.keep_train_images.clone(),
            extra: self.params.iter().cloned().collect(),
        }
    }
}

#[derive(Args)]
struct TargetArgs {
    /// New share name. Prints the current target when omitted.
    name: Option<String>,

    /// Use an explicit server root URL instead of a zrok share.
    #[arg(long, conflicts_with = "name")]
    url: Option<String>,
}

fn parse_param(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got {s:?}"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in {s:?}"));
    }
    Ok((key.to_string(), value.to_string()))
}

fn main() -> anyhow::Result<()> {
    // Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let path = cli.config.unwrap_or_else(config::default_path);
    let config = Config::load(&path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))?;
    tracing::debug!(path = %path.display(), "configuration loaded");

    let rt = tokio::runtime::Runtime::new()?;
    match cli.command {
        Commands::Upload(args) => rt.block_on(upload(args, &config)),
        Commands::Status => rt.block_on(status(&config)),
        Commands::Target(args) => set_target(args, config, &path),
        Commands::Config => show_config(&config, &path),
    }
}

async fn upload(args: UploadArgs, config: &Config) -> anyhow::Result<()> {
    let target = config.upload_target()?;
    let params = config.params.merged_with(&args.training_params());
    let job = UploadJob::from_path(&args.video, params.to_fields())
        .await
        .with_context(|| format!("cannot read {}", args.video.display()))?;

    let prober = HttpStatusProber::new(config.classifier(), config.probe_timeout())?;
    let transfer = HttpTransferClient::new(&config.transfer_settings())?;
    let mut orchestrator = UploadOrchestrator::new(
        Arc::new(prober),
        Arc::new(transfer),
        target,
        config.orchestrator_settings(),
    );
    let mut events = orchestrator
        .take_events()
        .context("event receiver already taken")?;

    let run = orchestrator.request_upload(job)?;
    tracing::info!(run, video = %args.video.display(), "upload requested");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        let event = tokio::select! {
            e = events.recv() => e,
            _ = &mut ctrl_c => {
                orchestrator.cancel();
                eprintln!();
                bail!("upload cancelled");
            }
        };
        let Some(event) = event else {
            bail!("orchestrator stopped without an outcome");
        };

        match event {
            UploadEvent::StateChanged { state, .. } => {
                tracing::debug!(state = %state, "state changed");
            }
            UploadEvent::Progress { percent, .. } => {
                eprint!("\rUploading... {percent}%");
                if percent == 100 {
                    eprintln!();
                }
            }
            UploadEvent::Outcome { outcome, .. } => match outcome {
                Outcome::Accepted if args.no_wait => {
                    println!("Upload accepted; not waiting for the job.");
                    return Ok(());
                }
                Outcome::Accepted => println!("Upload accepted, processing..."),
                Outcome::JobComplete(JobVerdict::Failed) => bail!("the server reported a failed job"),
                Outcome::JobComplete(verdict) => {
                    println!("Job finished ({}).", verdict_label(verdict));
                    return Ok(());
                }
                Outcome::Failed(e) => return Err(e.into()),
            },
        }
    }
}

async fn status(config: &Config) -> anyhow::Result<()> {
    let target = config.upload_target()?;
    let prober = HttpStatusProber::new(config.classifier(), config.probe_timeout())?;
    let state = prober.probe(&target.status_url()).await?;

    match state {
        ServerState::Idle(verdict) => {
            println!("{target}: idle (last job: {})", verdict_label(verdict))
        }
        ServerState::Busy => println!("{target}: busy"),
        ServerState::Unavailable { status } => bail!("{target}: status endpoint returned HTTP {status}"),
    }
    Ok(())
}

fn set_target(args: TargetArgs, mut config: Config, path: &std::path::Path) -> anyhow::Result<()> {
    if let Some(url) = args.url {
        let target = UploadTarget::with_root_url(&url)?;
        config.server_url = Some(target.root().to_string());
    } else if let Some(name) = args.name {
        let target = UploadTarget::zrok(&name)?;
        config.target = target.name().to_string();
        config.server_url = None;
    } else {
        let target = config.upload_target()?;
        println!("target: {}", target.name());
        println!("upload: {}", target.upload_url());
        println!("status: {}", target.status_url());
        return Ok(());
    }

    config.save(path)?;
    let target = config.upload_target()?;
    tracing::info!(target = %target, "target saved");
    println!("Target set to {}", target);
    Ok(())
}

fn show_config(config: &Config, path: &std::path::Path) -> anyhow::Result<()> {
    println!("# {}", path.display());
    print!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

fn verdict_label(verdict: JobVerdict) -> &'static str {
    match verdict {
        JobVerdict::Succeeded => "succeeded",
        JobVerdict::Failed => "failed",
        JobVerdict::Unknown => "outcome unknown",
    }
}
