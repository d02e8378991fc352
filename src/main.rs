use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use color_eyre::eyre::{Result, WrapErr, bail};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use lightbox::application::{
    PreviewLoadThread, PreviewOptions, ThumbnailImageCatcher, ThumbnailLoadThread,
    ThumbnailSettings,
};
use lightbox::domain::entities::{LoadEvent, LoadedImage, PreviewQuality};
use lightbox::infrastructure::cache::{self, LoadingCache};
use lightbox::infrastructure::config::{CliArgs, Command, EngineConfig, StorageManager};
use lightbox::infrastructure::{ExifMetadata, ImageCrateCodec, LoadSaveThread, TaskServices};

fn init_logging(config: &EngineConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_string()));

    if let Some(log_path) = config.effective_log_path() {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;

        let file_layer = fmt::layer()
            .with_writer(file)
            .with_ansi(false)
            .with_target(true)
            .with_thread_names(true);

        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .init();

        info!(path = %log_path.display(), "Logging initialized");
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    Ok(())
}

/// Loads the file and applies the command line, resetting values the flags made invalid.
fn load_config(args: &CliArgs) -> Result<(EngineConfig, Vec<&'static str>)> {
    let storage = StorageManager::new()?;
    let mut config = storage.load_config(args.config.as_deref())?;
    config.merge_with_args(args);
    let repaired = config.repair();
    Ok((config, repaired))
}

fn services(config: &EngineConfig) -> TaskServices {
    TaskServices {
        codec: Arc::new(ImageCrateCodec),
        metadata: Arc::new(ExifMetadata),
        color: Arc::new(config.color.color_management()),
    }
}

/// Saves every image on a dedicated thread and waits for the results.
async fn save_images(
    cache: Arc<LoadingCache>,
    config: &EngineConfig,
    jobs: Vec<(LoadedImage, PathBuf)>,
) -> Result<usize> {
    let (events, mut rx) = mpsc::unbounded_channel();
    let saver = LoadSaveThread::new(
        cache,
        services(config),
        events,
        config.thread_options("lightbox-saver"),
    );

    let mut pending = jobs.len();
    for (image, path) in jobs {
        let format = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("png")
            .to_string();
        saver.save(image, path, format);
    }

    let mut saved = 0;
    while pending > 0 {
        match rx.recv().await {
            Some(LoadEvent::Saved { path, success }) => {
                pending -= 1;
                if success {
                    println!("{}", path.display());
                    saved += 1;
                } else {
                    warn!(path = %path.display(), "Failed to save image");
                }
            }
            Some(LoadEvent::SavingProgress { .. }) => saver.notification_received(),
            Some(_) => {}
            None => break,
        }
    }
    Ok(saved)
}

async fn run_thumbnails(
    config: &EngineConfig,
    cache: Arc<LoadingCache>,
    paths: Vec<PathBuf>,
    size: Option<u32>,
    highlight: bool,
    out: &Path,
) -> Result<()> {
    let settings = ThumbnailSettings {
        size: config.thumbnails.size,
        max_size: config.thumbnails.max_size,
        highlight: config.thumbnails.highlight || highlight,
        exif_rotate: config.thumbnails.exif_rotate,
        color_managed: config.color.managed_previews,
    };
    let (events, _events) = mpsc::unbounded_channel();
    let (thread, _batches) = ThumbnailLoadThread::new(
        cache.clone(),
        services(config),
        events,
        settings,
        config.thread_options("lightbox-thumbnails"),
    );
    let thread = Arc::new(thread);

    let Some(size) = thread.check_size(size.unwrap_or(settings.size)) else {
        bail!("thumbnail size must be between 1 and {}", settings.max_size);
    };

    let catcher = Arc::new(ThumbnailImageCatcher::new(thread.clone()));
    catcher.set_active(true);
    thread.load_group(&paths, size);
    let expected = catcher.enqueue();
    debug!(expected, "Waiting for thumbnails");

    let waiter = catcher.clone();
    let images = tokio::task::spawn_blocking(move || waiter.wait_for_thumbnails()).await?;

    std::fs::create_dir_all(out)
        .wrap_err_with(|| format!("failed to create {}", out.display()))?;
    let mut jobs = Vec::with_capacity(images.len());
    for (path, image) in paths.iter().zip(images) {
        if image.is_null() {
            warn!(path = %path.display(), "No thumbnail produced");
            continue;
        }
        let stem = path
            .file_stem()
            .map_or_else(|| "image".into(), |stem| stem.to_string_lossy());
        jobs.push((image, out.join(format!("{stem}-{size}.png"))));
    }

    let requested = paths.len();
    let saved = save_images(cache, config, jobs).await?;
    info!(requested, saved, "Thumbnails written");
    if saved < requested {
        bail!("{} of {requested} thumbnails failed", requested - saved);
    }
    Ok(())
}

async fn run_preview(
    config: &EngineConfig,
    cache: Arc<LoadingCache>,
    path: &Path,
    quality: PreviewQuality,
    size: Option<u32>,
    out: PathBuf,
) -> Result<()> {
    let options = PreviewOptions {
        raw_loading: config.previews.raw_loading,
        convert_to_eight_bit: config.previews.convert_to_eight_bit,
        exif_rotate: config.previews.exif_rotate,
        color_managed: config.color.managed_previews,
    };
    let (events, mut rx) = mpsc::unbounded_channel();
    let previews = PreviewLoadThread::new(
        cache.clone(),
        services(config),
        events,
        options,
        config.thread_options("lightbox-previews"),
    );

    let description = previews.description(path, size.unwrap_or(config.previews.size), quality);
    previews.load_description(description);

    let image = loop {
        match rx.recv().await {
            Some(LoadEvent::Loaded { image, .. }) => break image,
            Some(LoadEvent::Progress { progress, .. }) => {
                debug!(progress, "Preview progress");
                previews.thread().notification_received();
            }
            Some(_) => {}
            None => bail!("preview loader stopped"),
        }
    };
    if image.is_null() {
        bail!("failed to load a preview of {}", path.display());
    }
    info!(path = %path.display(), dimensions = ?image.dimensions(), "Preview loaded");

    if save_images(cache, config, vec![(image, out)]).await? == 0 {
        bail!("failed to save the preview");
    }
    Ok(())
}

fn run_info(config: &EngineConfig, cache: &LoadingCache, json: bool) -> Result<()> {
    if json {
        let info = serde_json::json!({
            "config_path": config.effective_config_path(),
            "config": config,
            "cache": cache.stats(),
        });
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }
    if let Some(path) = config.effective_config_path() {
        println!("# {}", path.display());
    }
    println!("{}", toml::to_string_pretty(config)?);
    println!("# {}", cache.stats());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = CliArgs::parse();
    let (config, repaired) = load_config(&args)?;
    init_logging(&config)?;

    info!(version = lightbox::VERSION, "Starting {}", lightbox::NAME);
    if !repaired.is_empty() {
        warn!(?repaired, "Reset invalid configuration values");
    }

    let cache = cache::initialize(config.cache.options());

    let result = match args.command {
        Command::Thumbnail {
            paths,
            size,
            highlight,
            out,
        } => run_thumbnails(&config, cache, paths, size, highlight, &out).await,
        Command::Preview {
            path,
            quality,
            size,
            out,
        } => run_preview(&config, cache, &path, quality.into(), size, out).await,
        Command::Info { json } => run_info(&config, &cache, json),
    };

    cache::clean_up();
    result
}
