use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::Sender;
use std::thread::JoinHandle;
use tilesmith::archive::{self, ArchiveEntry, WrittenFile};
use tilesmith::batch::{BatchEvent, RunOutcome};
use tilesmith::config::{self, ToolConfig};
use tilesmith::imaging::{GridType, RustSampler, open_image};
use tilesmith::services::LocalUpscaler;
use tilesmith::types::{ItemReport, WorkItem, WorkStatus};
use tilesmith::workflow::{
    CropWorkflow, EnhanceWorkflow, ImageQueue, Pan, SplitWorkflow, WorkflowError,
};
use tilesmith::{naming, output, scan};

fn version_string() -> &'static str {
    let on_tag = env!("ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            // Leaked once at startup, called exactly once
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "tilesmith")]
#[command(about = "Split, crop and enhance images in cancellable batches")]
#[command(long_about = "\
Split, crop and enhance images in cancellable batches

  split    one image → uniform grid of equal-sized tiles
  crop     many images → one aspect ratio, optional pan
  enhance  many images → upscaled to the configured width

Inputs may be files or directories (walked recursively, hidden entries
skipped). Results are written as PNG into the output directory (or bundled
into all_images.zip with --zip) together with a manifest.json describing
every item.

Run 'tilesmith gen-config' to generate a documented config.toml.")]
#[command(version = version_string())]
struct Cli {
    /// Configuration file (missing file = stock defaults)
    #[arg(long, default_value = "config.toml", global = true)]
    config: PathBuf,

    /// Output directory
    #[arg(long, default_value = "tilesmith-out", global = true)]
    output: PathBuf,

    /// Bundle results into a single all_images.zip instead of loose PNGs
    #[arg(long, global = true)]
    zip: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args)]
struct SplitArgs {
    /// Image to split
    input: PathBuf,

    /// Tile count: 4, 6, 8, 9 or 12
    #[arg(long)]
    grid: Option<u32>,

    /// Layout index for the tile count (0 = landscape, 1 = portrait)
    #[arg(long)]
    layout: Option<usize>,

    /// Upscale every tile before export
    #[arg(long)]
    enhance: bool,
}

#[derive(clap::Args)]
struct CropArgs {
    /// Image files or directories
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Aspect preset, e.g. 1:1, 4:5, 16:9
    #[arg(long)]
    ratio: Option<String>,

    /// Horizontal pan in percent of the sampling window
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    pan_x: f64,

    /// Vertical pan in percent of the sampling window
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    pan_y: f64,
}

#[derive(clap::Args)]
struct EnhanceArgs {
    /// Image files or directories
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Output width (overrides enhance.target_width)
    #[arg(long)]
    target_width: Option<u32>,
}

#[derive(Subcommand)]
enum Command {
    /// Split one image into a uniform grid of tiles
    Split(SplitArgs),
    /// Crop images to an aspect ratio
    Crop(CropArgs),
    /// Upscale images to the target width
    Enhance(EnhanceArgs),
    /// Print a stock config.toml with all options documented
    GenConfig,
}

/// Contents of `manifest.json`.
#[derive(Serialize)]
struct RunManifest<'a> {
    command: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<String>,
    items: Vec<ItemReport>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let export = Export {
        dir: &cli.output,
        zip: cli.zip,
    };

    match cli.command {
        Command::Split(args) => {
            let mut config = config::load_config(&cli.config)?;
            if let Some(count) = args.grid {
                config.split.grid = GridType::try_from(count)?;
                config.split.layout = 0;
            }
            if let Some(layout) = args.layout {
                config.split.layout = layout;
            }
            config.validate()?;
            init_thread_pool(&config.processing);
            run_split(&export, &config, &args)?;
        }
        Command::Crop(args) => {
            let mut config = config::load_config(&cli.config)?;
            if let Some(ratio) = args.ratio.clone() {
                config.crop.ratio = ratio;
            }
            config.validate()?;
            init_thread_pool(&config.processing);
            run_crop(&export, &config, &args)?;
        }
        Command::Enhance(args) => {
            let mut config = config::load_config(&cli.config)?;
            if let Some(width) = args.target_width {
                config.enhance.target_width = width;
            }
            config.validate()?;
            init_thread_pool(&config.processing);
            run_enhance(&export, &config, &args)?;
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

fn run_split(
    out: &Export,
    config: &ToolConfig,
    args: &SplitArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let grid = config.split.grid_spec()?;
    let image = open_image(&args.input)?;
    let name = file_name(&args.input);
    let rt = runtime()?;

    let (tx, printer) = spawn_printer();
    let (tiles, entries) = {
        let workflow = SplitWorkflow::with_parts(
            RustSampler::new(),
            LocalUpscaler::new(config.enhance.target_width),
        )
        .with_events(tx)
        .with_timeout(config.batch.timeout());
        workflow.set_source(&name, image);
        workflow.set_grid(grid);
        workflow.split()?;
        if args.enhance {
            rt.block_on(async {
                for tile in workflow.tiles() {
                    workflow.enhance_tile(&tile.id).await?;
                }
                Ok::<_, WorkflowError>(())
            })?;
        }
        (workflow.tiles(), workflow.export_all())
    };
    join_printer(printer)?;

    output::print_split_output(&name, grid, &tiles);
    let written = out.write(&entries)?;
    write_manifest(out.dir, "split", Some(name), &tiles, &written, |_| true)
}

fn run_crop(
    out: &Export,
    config: &ToolConfig,
    args: &CropArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let rt = runtime()?;
    let (tx, printer) = spawn_printer();
    let (items, entries) = {
        let workflow = CropWorkflow::with_sampler(
            RustSampler::new(),
            config.crop.aspect()?,
            config.crop.tuning(),
            config.batch.max_items,
        )
        .with_events(tx);
        load_inputs(workflow.queue(), &args.inputs, config.batch.max_items)?;
        if args.pan_x != 0.0 || args.pan_y != 0.0 {
            let pan = Pan {
                x: args.pan_x,
                y: args.pan_y,
            };
            for item in workflow.queue().items() {
                workflow.set_pan(&item.id, pan)?;
            }
        }
        report_run(rt.block_on(workflow.process_all()));
        (workflow.queue().items(), workflow.downloads())
    };
    join_printer(printer)?;

    let written = out.write(&entries)?;
    write_manifest(out.dir, "crop", None, &items, &written, is_exported)
}

fn run_enhance(
    out: &Export,
    config: &ToolConfig,
    args: &EnhanceArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let rt = runtime()?;
    let (tx, printer) = spawn_printer();
    let (items, entries) = {
        let workflow = EnhanceWorkflow::with_limit(
            LocalUpscaler::new(config.enhance.target_width),
            config.batch.max_items,
        )
        .with_events(tx)
        .with_timeout(config.batch.timeout());
        load_inputs(workflow.queue(), &args.inputs, config.batch.max_items)?;
        report_run(rt.block_on(workflow.process_all()));
        (workflow.queue().items(), workflow.downloads())
    };
    join_printer(printer)?;

    let written = out.write(&entries)?;
    write_manifest(out.dir, "enhance", None, &items, &written, is_exported)
}

/// Where and how results are written.
struct Export<'a> {
    dir: &'a Path,
    zip: bool,
}

impl Export<'_> {
    fn write(&self, entries: &[ArchiveEntry]) -> Result<Vec<WrittenFile>, archive::ArchiveError> {
        if self.zip {
            let path = self.dir.join(naming::ZIP_ARCHIVE_NAME);
            let written = archive::write_zip_archive(&path, entries)?;
            output::print_export_output(&path, &written);
            Ok(written)
        } else {
            let written = archive::write_archive(self.dir, entries)?;
            output::print_export_output(self.dir, &written);
            Ok(written)
        }
    }
}

/// Collect, decode and enqueue inputs, reporting drops and decode failures.
///
/// Only as many files as the queue has room for are decoded.
fn load_inputs(
    queue: &ImageQueue,
    inputs: &[PathBuf],
    limit: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let files = scan::collect_inputs(inputs)?;
    let decoded = scan::decode_inputs(&files, queue.remaining());
    let mut outcome = queue.add_all(decoded.images.into_iter().map(|d| (d.name, d.image)))?;
    outcome.dropped += decoded.skipped;
    output::print_intake(&outcome, limit, &decoded.failures);
    Ok(())
}

fn report_run(outcome: RunOutcome) {
    if outcome == RunOutcome::Cancelled {
        eprintln!("Run was cancelled; partial results only");
    }
}

fn is_exported(item: &WorkItem) -> bool {
    item.status == WorkStatus::Completed && item.result.is_some()
}

/// Write `manifest.json`, pairing exported items with their files in order.
fn write_manifest(
    out: &Path,
    command: &str,
    source: Option<String>,
    items: &[Arc<WorkItem>],
    written: &[WrittenFile],
    exported: impl Fn(&WorkItem) -> bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut files = written.iter();
    let items = items
        .iter()
        .map(|item| {
            let mut report = ItemReport::from(item.as_ref());
            if exported(item.as_ref()) {
                report.file = files.next().map(|f| f.name.clone());
            }
            report
        })
        .collect();
    let manifest = RunManifest {
        command,
        source,
        items,
    };
    let json = serde_json::to_string_pretty(&manifest)?;
    std::fs::write(out.join("manifest.json"), json)?;
    Ok(())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Single-threaded runtime: runs are sequential, only timeouts need a timer.
fn runtime() -> std::io::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
}

fn spawn_printer() -> (Sender<BatchEvent>, JoinHandle<()>) {
    let (tx, rx) = std::sync::mpsc::channel();
    let printer = std::thread::spawn(move || {
        for event in rx {
            for line in output::format_batch_event(&event) {
                println!("{}", line);
            }
        }
    });
    (tx, printer)
}

fn join_printer(printer: JoinHandle<()>) -> Result<(), Box<dyn std::error::Error>> {
    printer.join().map_err(|_| "event printer panicked")?;
    Ok(())
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores; user can constrain down, not up.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
