//! CLI for ClipWeave - multi-image AI video generation.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use clipweave::{
    preset_credentials_from_env, GenerationService, HttpGenerationService, ImageAsset,
    ProbeOutcome, ProviderKind, RawCredentials, Workflow, WorkflowConfig, WorkflowState,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "clipweave")]
#[command(about = "Turn up to six images into an AI-generated video (Kling, MiniMax)")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Base URL of the generation service
    #[arg(long, global = true, env = "CLIPWEAVE_BASE_URL")]
    base_url: Option<String>,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List the API providers offered by the service
    Providers,

    /// Upload images, start a generation and wait for the video
    Generate(GenerateArgs),

    /// Check once whether a video is ready
    Status {
        /// Video id returned when the generation started
        video_id: String,
    },
}

#[derive(Args)]
struct GenerateArgs {
    /// Provider id (defaults to the first provider the service offers)
    #[arg(short, long)]
    provider: Option<String>,

    /// Input image, repeat for each image (1-6)
    #[arg(short, long = "image", required = true)]
    images: Vec<PathBuf>,

    /// Prompt for the image at the same position, repeat for each image
    #[arg(long = "prompt", required = true)]
    prompts: Vec<String>,

    /// Kling access key id
    #[arg(long, env = "KLING_ACCESS_KEY", hide_env_values = true)]
    access_key_id: Option<String>,

    /// Kling access key secret
    #[arg(long, env = "KLING_SECRET_KEY", hide_env_values = true)]
    access_key_secret: Option<String>,

    /// MiniMax API key
    #[arg(long, env = "MINIMAX_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// MiniMax group id
    #[arg(long, env = "MINIMAX_GROUP_ID")]
    group_id: Option<String>,

    /// Use preset credentials from the environment instead of the flags
    #[arg(long)]
    dev: bool,

    /// Save the finished video to this path
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Seconds between status checks
    #[arg(long)]
    poll_interval: Option<u64>,

    /// Give up after this many status checks
    #[arg(long)]
    max_probes: Option<u32>,

    /// Give up after this many seconds of polling
    #[arg(long)]
    timeout: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("clipweave=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let service = build_service(cli.base_url)?;

    match cli.command {
        Commands::Providers => {
            list_providers(&service, cli.json).await?;
        }
        Commands::Generate(args) => {
            generate_video(args, service, cli.json).await?;
        }
        Commands::Status { video_id } => {
            check_status(&service, &video_id, cli.json).await?;
        }
    }

    Ok(())
}

fn build_service(base_url: Option<String>) -> anyhow::Result<HttpGenerationService> {
    let mut builder = HttpGenerationService::builder();
    if let Some(url) = base_url {
        builder = builder.base_url(url);
    }
    Ok(builder.build()?)
}

async fn list_providers(service: &HttpGenerationService, json_output: bool) -> anyhow::Result<()> {
    let providers = service
        .list_providers()
        .await
        .context("Failed to fetch available API providers")?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&providers)?);
    } else {
        println!("Available providers:\n");
        for p in &providers {
            let credentials = p
                .required_fields()
                .iter()
                .map(|f| f.label())
                .collect::<Vec<_>>()
                .join(" + ");
            println!("  {} ({})", p.name, p.id);
            if !credentials.is_empty() {
                println!("    Credentials: {}", credentials);
            }
        }
    }

    Ok(())
}

async fn check_status(
    service: &HttpGenerationService,
    video_id: &str,
    json_output: bool,
) -> anyhow::Result<()> {
    let outcome = service.probe(video_id).await?;
    let status = match outcome {
        ProbeOutcome::Ready => "ready",
        ProbeOutcome::Pending => "pending",
        ProbeOutcome::Unexpected(_) => "error",
    };

    if json_output {
        let result = serde_json::json!({
            "video_id": video_id,
            "status": status,
            "http_status": match outcome {
                ProbeOutcome::Unexpected(code) => Some(code),
                _ => None,
            },
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        match outcome {
            ProbeOutcome::Ready => println!(
                "Video {} is ready: {}",
                video_id,
                service.video_url(&clipweave::VideoHandle::new(video_id))
            ),
            ProbeOutcome::Pending => println!("Video {} is still being generated", video_id),
            ProbeOutcome::Unexpected(code) => {
                anyhow::bail!("service answered {} for video {}", code, video_id)
            }
        }
    }

    Ok(())
}

async fn generate_video(
    args: GenerateArgs,
    service: HttpGenerationService,
    json_output: bool,
) -> anyhow::Result<()> {
    let mut images = Vec::with_capacity(args.images.len());
    for path in &args.images {
        let image = ImageAsset::from_path(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        images.push(image);
    }

    let providers = service
        .list_providers()
        .await
        .context("Failed to fetch available API providers")?;
    let selected = args
        .provider
        .clone()
        .or_else(|| providers.first().map(|p| p.id.clone()))
        .context("the service offers no API providers")?;
    let kind = ProviderKind::from_id(&selected);

    let mut config = WorkflowConfig::from_env(kind);
    if args.dev && !config.dev_mode {
        config.dev_mode = true;
        config.preset_credentials = kind.and_then(preset_credentials_from_env);
    }
    if args.dev && config.preset_credentials.is_none() {
        tracing::warn!(provider = %selected, "no preset credentials found in the environment");
    }
    if let Some(secs) = args.poll_interval {
        config.poll = config.poll.interval(Duration::from_secs(secs));
    }
    if let Some(n) = args.max_probes {
        config.poll = config.poll.max_probes(n);
    }
    if let Some(secs) = args.timeout {
        config.poll = config.poll.timeout(Duration::from_secs(secs));
    }

    let mut workflow = Workflow::new(service.clone(), config)?.with_providers(providers);
    workflow.select_provider(selected);
    workflow.set_images(images)?;
    workflow.set_prompts(args.prompts.clone())?;

    let raw = RawCredentials {
        access_key_id: args.access_key_id.clone().unwrap_or_default(),
        access_key_secret: args.access_key_secret.clone().unwrap_or_default(),
        api_key: args.api_key.clone().unwrap_or_default(),
        group_id: args.group_id.clone().unwrap_or_default(),
    };

    let cancel = workflow.cancel_handle();
    let interrupt = tokio::spawn(async move {
        let mut cancelled = false;
        while tokio::signal::ctrl_c().await.is_ok() {
            if !cancelled && cancel.cancel() {
                cancelled = true;
                tracing::info!("cancelling, press Ctrl-C again to abort");
                continue;
            }
            std::process::exit(130);
        }
    });

    let mut states = workflow.subscribe();
    let progress = tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let state = states.borrow_and_update().clone();
            if let Some(line) = status_line(&state) {
                tracing::info!(state = state.label(), "{}", line);
            }
        }
    });

    let state = workflow.run(&raw).await;
    interrupt.abort();
    progress.abort();

    match state {
        WorkflowState::Succeeded(handle) => {
            let url = service.video_url(&handle);
            let mut size_bytes = None;
            if let Some(output) = &args.output {
                let video = workflow.fetch_video().await?;
                video.save(output).await?;
                size_bytes = Some(video.size());
            }

            if json_output {
                let result = serde_json::json!({
                    "type": "video",
                    "success": true,
                    "video_id": handle.video_id,
                    "url": url,
                    "output": args.output.as_ref().map(|p| p.display().to_string()),
                    "size_bytes": size_bytes,
                    "provider": workflow.selected_provider(),
                });
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Video generated successfully: {}", url);
                if let (Some(output), Some(size)) = (&args.output, size_bytes) {
                    println!("Saved to {} ({} bytes)", output.display(), size);
                }
            }
            Ok(())
        }
        WorkflowState::Idle => {
            let video_id = workflow.job().map(|j| j.id.clone());
            if json_output {
                let result = serde_json::json!({
                    "type": "video",
                    "success": false,
                    "cancelled": true,
                    "video_id": video_id,
                });
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Generation cancelled.");
                if let Some(id) = video_id {
                    println!("The job may still finish; check with `clipweave status {}`", id);
                }
            }
            Ok(())
        }
        WorkflowState::Failed { kind, message } => {
            if json_output {
                let result = serde_json::json!({
                    "type": "video",
                    "success": false,
                    "stage": kind,
                    "error": message,
                });
                println!("{}", serde_json::to_string_pretty(&result)?);
                std::process::exit(1);
            }
            anyhow::bail!("{} failed: {}", kind, message)
        }
        other => anyhow::bail!("generation stopped in unexpected state: {}", other),
    }
}

fn status_line(state: &WorkflowState) -> Option<&'static str> {
    match state {
        WorkflowState::Validating => Some("Checking inputs..."),
        WorkflowState::Uploading => Some("Uploading images..."),
        WorkflowState::Submitting => Some("Starting video generation..."),
        WorkflowState::Polling(_) => {
            Some("Video is being generated. This may take a few minutes. (Ctrl-C to cancel)")
        }
        _ => None,
    }
}
