use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};

use foodwatch::{
    CaptureSession, DetectionPipeline, DeviceClaims, EventBus, FoodwatchConfig, StubCamera,
};

#[derive(Parser, Debug)]
#[command(name = "foodwatch")]
#[command(about = "Food-waste detection station: camera capture, remote classification, and alert workflow")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "foodwatch.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without starting")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Dry run mode - initialize but don't capture or submit
    #[arg(long, help = "Initialize the pipeline but don't capture or submit")]
    dry_run: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        println!("{}", FoodwatchConfig::default_toml()?);
        return Ok(());
    }

    init_logging(&args)?;

    info!("Starting foodwatch v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let config = match FoodwatchConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if args.validate_config {
        println!("Configuration is valid");
        return Ok(());
    }

    let event_bus = Arc::new(EventBus::new(config.system.event_bus_capacity));
    spawn_event_logger(&event_bus);

    let claims = DeviceClaims::new();
    let camera = Arc::new(StubCamera::new(config.camera.device.clone(), claims));
    let mut session = CaptureSession::new(
        camera,
        Arc::clone(&event_bus),
        config.camera.orientation,
        config.camera.ideal_resolution,
    );
    let mut pipeline = DetectionPipeline::new(config.clone(), Arc::clone(&event_bus))?;

    if args.dry_run {
        info!("Dry run complete - pipeline initialized, nothing captured");
        return Ok(());
    }

    // Camera start is an explicit transition, not a construction side effect
    session.start(config.camera.orientation).await?;

    let result = pipeline.capture_and_submit(&mut session).await;
    match &result {
        Ok(Some(counts)) => {
            for (class_name, count) in counts {
                info!("Detected {} x{}", class_name, count);
            }
            if let Some(alert) = pipeline.active_alert() {
                info!(
                    "Alert active: {} count ({}) meets threshold ({})",
                    alert.class_name, alert.observed_count, alert.threshold
                );
            }
        }
        Ok(None) => info!("Detection response was stale and discarded"),
        Err(e) => error!("Pipeline run failed: {}", e),
    }

    session.stop();
    pipeline.clear_alert();
    info!("Shutdown complete");

    result.map(|_| ()).map_err(Into::into)
}

fn spawn_event_logger(event_bus: &Arc<EventBus>) {
    let mut receiver = event_bus.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = receiver.recv().await {
            info!("[event] {}", event.description());
        }
    });
}

fn init_logging(args: &Args) -> Result<()> {
    let level = if args.debug {
        "debug"
    } else if args.quiet {
        "error"
    } else if args.verbose {
        "info"
    } else {
        "warn"
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("foodwatch={}", level)));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match args.log_format.as_deref() {
        Some("json") => builder.json().init(),
        Some("compact") => builder.compact().init(),
        Some("pretty") | None => builder.pretty().init(),
        Some(other) => {
            eprintln!("Unknown log format '{}', using pretty", other);
            builder.pretty().init();
        }
    }
    Ok(())
}
