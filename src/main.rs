use clap::{Parser, Subcommand};
use pixelforge::asset::ingest;
use pixelforge::background::BackgroundRemover;
use pixelforge::batch::{BatchOperation, BatchOrchestrator, StagedUploads, resolve_batch};
use pixelforge::config::{self, CONFIG_FILENAME, EngineConfig};
use pixelforge::imaging::OutputFormat;
use pixelforge::resolve::{RawParams, ResolvePolicy, TransformRequest, parse_size};
use pixelforge::storage::{Storage, open_storage};
use pixelforge::{output, pipeline, presets};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pixelforge")]
#[command(about = "Deterministic image transforms and batch processing")]
#[command(long_about = "\
Deterministic image transforms and batch processing

Transforms are described by key=value parameters and always run in the
same order, whatever order the parameters are given in:

  decode → crop → resize → rotate → grayscale → enhance → compress → watermark → encode

Parameters:
  width, height            Resize target; one side keeps the aspect ratio
  crop_x, crop_y,
  crop_width, crop_height  Crop rectangle in source pixels (all four or none)
  rotate                   90, 180 or 270 (counter-clockwise)
  grayscale                true/false
  enhance, compress        true/false
  optimize                 enhance + compress, unless either is set explicitly
  watermark                Text drawn in the bottom-right corner
  format                   jpeg, png or webp (default: source format)
  quality                  1-100, clamped (default: 85)

Run 'pixelforge gen-config' to generate a documented pixelforge.toml.")]
#[command(version)]
struct Cli {
    /// Config file
    #[arg(long, default_value = CONFIG_FILENAME, global = true)]
    config: PathBuf,

    /// More log output (-v info, -vv debug, -vvv trace). RUST_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

/// Transform parameters shared by `transform` and `batch`.
#[derive(clap::Args, Clone)]
struct ParamArgs {
    /// Transform parameter, repeatable
    #[arg(short = 'p', long = "param", value_name = "KEY=VALUE")]
    params: Vec<String>,

    /// Start from a preset declared under [presets.<name>]
    #[arg(long)]
    preset: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    #[command(flatten)]
    Image(ImageCommand),
    /// Print a stock pixelforge.toml with all options documented
    GenConfig,
}

/// Commands that need a loaded config.
#[derive(Subcommand)]
enum ImageCommand {
    /// Store an image and print its asset record
    Upload {
        file: PathBuf,
        #[arg(long)]
        owner: String,
    },
    /// Apply a transform to one image
    Transform {
        file: PathBuf,
        #[command(flatten)]
        params: ParamArgs,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Center-crop and scale to an exact size
    Thumbnail {
        file: PathBuf,
        /// Target size as WxH (default from config)
        #[arg(long)]
        size: Option<String>,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Remove the background and add an alpha channel
    RemoveBg {
        file: PathBuf,
        /// Output format (default from config)
        #[arg(long)]
        format: Option<String>,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Store several images and process them as one batch into a zip
    Batch {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        #[command(flatten)]
        params: ParamArgs,
        /// Remove backgrounds instead of transforming
        #[arg(long, conflicts_with_all = ["params", "preset"])]
        remove_bg: bool,
        #[arg(long, default_value = "cli")]
        owner: String,
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
            Ok(())
        }
        Command::Image(command) => {
            let config = config::load_config(&cli.config)?;
            run(command, &config)
        }
    }
}

fn run(command: ImageCommand, config: &EngineConfig) -> Result<(), Box<dyn std::error::Error>> {
    let policy = ResolvePolicy::from(config);

    match command {
        ImageCommand::Upload { file, owner } => {
            let storage = open_storage(&config.storage)?;
            let bytes = std::fs::read(&file)?;
            let asset = ingest(storage.as_ref(), &owner, &bytes, &config.upload)?;
            println!("{}", serde_json::to_string_pretty(&asset)?);
        }
        ImageCommand::Transform {
            file,
            params,
            output: out,
        } => {
            let raw = collect_params(config, &params)?;
            let request = TransformRequest::parse(&raw, &policy)?;
            let bytes = std::fs::read(&file)?;
            let result = pipeline::execute_request(&bytes, &request)?;
            std::fs::write(&out, &result.bytes)?;
            output::print_output(&file, &out, &result);
        }
        ImageCommand::Thumbnail {
            file,
            size,
            output: out,
        } => {
            let size = match size {
                Some(value) => parse_size(&value, policy.max_thumbnail)?,
                None => policy.default_thumbnail,
            };
            let bytes = std::fs::read(&file)?;
            let result = pipeline::thumbnail(&bytes, size, policy.default_quality)?;
            std::fs::write(&out, &result.bytes)?;
            output::print_output(&file, &out, &result);
        }
        ImageCommand::RemoveBg {
            file,
            format,
            output: out,
        } => {
            let format = parse_format(format.as_deref(), config)?;
            let remover = BackgroundRemover::from_config(&config.background_removal);
            let bytes = std::fs::read(&file)?;
            let result =
                pipeline::remove_background(&remover, &bytes, format, policy.default_quality)?;
            std::fs::write(&out, &result.bytes)?;
            output::print_output(&file, &out, &result);
        }
        ImageCommand::Batch {
            files,
            params,
            remove_bg,
            owner,
            output: out,
        } => {
            let operation = if remove_bg {
                BatchOperation::RemoveBackground {
                    format: config.background_removal.output_format,
                    quality: policy.default_quality,
                }
            } else {
                resolve_batch(&collect_params(config, &params)?, &policy)?
            };

            let storage: Arc<dyn Storage> = Arc::from(open_storage(&config.storage)?);
            let staged = StagedUploads::stage(
                storage.as_ref(),
                &owner,
                &files,
                &config.upload,
                &config.batch,
            )?;
            output::print_rejected_uploads(&staged.rejected);
            if staged.ids.is_empty() {
                return Err("no file could be stored".into());
            }

            let remover = Arc::new(BackgroundRemover::from_config(&config.background_removal));
            let index = Arc::new(staged.index.clone());
            let result = BatchOrchestrator::new(&config.batch, storage.clone(), index)
                .and_then(|orch| orch.with_remover(remover).run_batch(&staged.ids, &operation));
            // Originals only exist for this run.
            staged.release(storage.as_ref());
            let archive = result?;

            std::fs::write(&out, &archive.bytes)?;
            output::print_batch_output(operation.name(), &archive, &out);
            if archive.is_total_failure() {
                return Err("every batch item failed".into());
            }
        }
    }

    Ok(())
}

/// Install the stderr subscriber. `RUST_LOG` wins over `-v`.
fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("pixelforge={level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

/// Preset values (if any) overlaid with the `-p` pairs.
fn collect_params(
    config: &EngineConfig,
    args: &ParamArgs,
) -> Result<RawParams, Box<dyn std::error::Error>> {
    let explicit = args
        .params
        .iter()
        .map(|pair| RawParams::parse_pair(pair))
        .collect::<pixelforge::Result<RawParams>>()?;
    Ok(match &args.preset {
        Some(name) => presets::find_preset(config, name)?.apply(&explicit),
        None => explicit,
    })
}

fn parse_format(
    value: Option<&str>,
    config: &EngineConfig,
) -> Result<OutputFormat, Box<dyn std::error::Error>> {
    match value {
        Some(v) => OutputFormat::parse(v)
            .ok_or_else(|| pixelforge::PipelineError::UnsupportedFormat(v.to_string()).into()),
        None => Ok(config.background_removal.output_format),
    }
}
