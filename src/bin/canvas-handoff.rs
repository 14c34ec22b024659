use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::Context as _;
use canvas_handoff::{
    bridge::RecordingHibernationLogger,
    dispatcher::DispatcherStats,
    gpu::{GpuContext, SoftwareGpu, SoftwareGpuStats},
    provider::ProviderStats,
    FlushReason, HandoffConfig, HibernationEvent, HibernationState, IntRect, LayerBridge,
    PlaceholderId, PlaceholderRegistry, RecordingFrameSink, Rect, ResourceDispatcher,
    ResourceProvider, Rgba8Premul, TaskQueue,
};
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "canvas-handoff", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Animate an offscreen canvas through a dispatcher and a placeholder, then print stats.
    Offscreen(OffscreenArgs),
    /// Hide a GPU canvas until it hibernates, show it again, then print the events.
    Hibernate(HibernateArgs),
    /// Draw a test pattern and write it as a PNG.
    Snapshot(SnapshotArgs),
}

#[derive(Parser, Debug)]
struct OffscreenArgs {
    /// Number of frames to dispatch.
    #[arg(long, default_value_t = 60)]
    frames: u32,

    /// Optional config JSON.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct HibernateArgs {
    /// Optional config JSON.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct SnapshotArgs {
    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,

    /// Optional config JSON.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(serde::Serialize)]
struct OffscreenReport {
    frames: u32,
    dispatcher: DispatcherStats,
    provider: ProviderStats,
    placeholder_frames_received: u64,
    still_exported: usize,
    gpu: Option<SoftwareGpuStats>,
}

#[derive(serde::Serialize)]
struct HibernateReport {
    events: Vec<HibernationEvent>,
    state_while_hidden: HibernationState,
    state_after_show: HibernationState,
    content_preserved: bool,
    gpu: SoftwareGpuStats,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Command::Offscreen(args) => cmd_offscreen(args),
        Command::Hibernate(args) => cmd_hibernate(args),
        Command::Snapshot(args) => cmd_snapshot(args),
    }
}

fn read_config(path: Option<&Path>) -> anyhow::Result<HandoffConfig> {
    match path {
        Some(path) => HandoffConfig::from_path(path)
            .with_context(|| format!("load config '{}'", path.display())),
        None => Ok(HandoffConfig::default()),
    }
}

fn print_json(report: &impl serde::Serialize) -> anyhow::Result<()> {
    let s = serde_json::to_string_pretty(report).context("serialize report")?;
    println!("{s}");
    Ok(())
}

/// A bar sweeping left to right over a dark background.
fn draw_frame(canvas: &mut canvas_handoff::raster::PaintCanvas, index: u32) {
    let size = canvas.size();
    let w = f64::from(size.width);
    let h = f64::from(size.height);
    let bar = (w / 8.0).max(1.0);
    let x = (f64::from(index) * bar) % w;
    canvas.clear(Rgba8Premul::opaque(18, 20, 28));
    canvas.fill_rect(Rect::new(x, 0.0, x + bar, h), Rgba8Premul::opaque(240, 120, 40));
}

fn cmd_offscreen(args: OffscreenArgs) -> anyhow::Result<()> {
    let config = read_config(args.config.as_deref())?;
    let gpu = config
        .provider
        .kind
        .needs_gpu()
        .then(|| Arc::new(SoftwareGpu::new()));

    let mut registry = PlaceholderRegistry::new();
    let placeholder = PlaceholderId(1);
    registry.register(placeholder);

    let sink = RecordingFrameSink::new();
    let mut dispatcher = ResourceDispatcher::new(
        config.size,
        Box::new(sink.clone()),
        config.dispatcher,
        Some(registry.handle(placeholder)),
    )?;
    let mut provider = ResourceProvider::new(
        config.size,
        config.provider,
        gpu.clone().map(|g| g as Arc<dyn GpuContext>),
    )?;

    for index in 0..args.frames {
        let canvas = provider.canvas().context("provider has no paint target")?;
        draw_frame(canvas, index);
        let resource = provider
            .produce_resource(FlushReason::CanvasPushFrame)
            .context("provider produced no resource")?;
        dispatcher.dispatch_frame(
            resource,
            Duration::from_millis(u64::from(index) * 16),
            IntRect::from_size(config.size),
            false,
            true,
        );

        // The compositor displays the frame and returns the previous ones.
        let returned = sink.take_returns();
        dispatcher.did_receive_compositor_frame_ack(&returned);
        registry.process_messages();
        dispatcher.process_messages();
    }

    let report = OffscreenReport {
        frames: args.frames,
        dispatcher: dispatcher.stats(),
        provider: provider.stats(),
        placeholder_frames_received: registry
            .get(placeholder)
            .map_or(0, |p| p.frames_received()),
        still_exported: dispatcher.exported_resource_ids().len(),
        gpu: gpu.map(|g| g.stats()),
    };
    print_json(&report)
}

fn cmd_hibernate(args: HibernateArgs) -> anyhow::Result<()> {
    let config = read_config(args.config.as_deref())?;
    let gpu = Arc::new(SoftwareGpu::new());
    let tasks = TaskQueue::new();
    let logger = RecordingHibernationLogger::new();

    let mut bridge = LayerBridge::new(
        config.size,
        config.bridge,
        Some(gpu.clone() as Arc<dyn GpuContext>),
        tasks.clone(),
    )?;
    bridge.set_hibernation_logger(std::rc::Rc::new(logger.clone()));

    {
        let mut canvas = bridge.canvas().context("canvas has no usable surface")?;
        draw_frame(&mut canvas, 0);
    }
    bridge.finalize_frame(FlushReason::Testing);
    let before = bridge
        .new_image_snapshot(FlushReason::Testing)
        .context("snapshot before hiding")?
        .read_pixels()?;

    bridge.set_is_in_hidden_page(true);
    tasks.run_idle_tasks();
    let state_while_hidden = bridge.hibernation_state();

    bridge.set_is_in_hidden_page(false);
    let after = bridge
        .new_image_snapshot(FlushReason::Testing)
        .context("snapshot after showing")?
        .read_pixels()?;

    let report = HibernateReport {
        events: logger.events(),
        state_while_hidden,
        state_after_show: bridge.hibernation_state(),
        content_preserved: before == after,
        gpu: gpu.stats(),
    };
    print_json(&report)
}

fn cmd_snapshot(args: SnapshotArgs) -> anyhow::Result<()> {
    let config = read_config(args.config.as_deref())?;
    let gpu = config
        .provider
        .kind
        .needs_gpu()
        .then(|| Arc::new(SoftwareGpu::new()) as Arc<dyn GpuContext>);
    let mut provider = ResourceProvider::new(config.size, config.provider, gpu)?;
    draw_frame(
        provider.canvas().context("provider has no paint target")?,
        3,
    );
    let image = provider
        .snapshot(FlushReason::Snapshot)
        .context("provider produced no snapshot")?;
    let data = image.read_straight_pixels()?;
    let size = image.size();

    if let Some(parent) = args.out.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }

    image::save_buffer_with_format(
        &args.out,
        &data,
        size.width,
        size.height,
        image::ColorType::Rgba8,
        image::ImageFormat::Png,
    )
    .with_context(|| format!("write png '{}'", args.out.display()))?;

    eprintln!("wrote {}", args.out.display());
    Ok(())
}
