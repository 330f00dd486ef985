use chrono::{Duration as ChronoDuration, Utc};
use clap::Parser;
use colored::*;
use eyre::{Context, Result, eyre};
use log::info;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

mod cli;

use cli::Cli;
use cli::commands::{Commands, TagsetCommands};

use artloop::activity::SqliteActivityLog;
use artloop::config::ArtloopConfig;
use artloop::domain::{DeviceState, PowerState, Tagset};
use artloop::guard::ExecutionGuard;
use artloop::library::JsonLibrary;
use artloop::observer::Observers;
use artloop::scheduler::{DeviceScheduler, SchedulerContext};
use artloop::store::StateStore;
use artloop::tagsets::TagsetStore;
use artloop::transfer::{HttpTransfer, PowerStateCache};

fn setup_logging() -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("artloop")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("artloop.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

/// Build the shared context from config: library, stores, transfer, guard
fn build_context(config: &ArtloopConfig) -> Result<(Arc<SchedulerContext>, PowerStateCache)> {
    let library = JsonLibrary::new(&config.library.dir);

    let store = match &config.storage.state_dir {
        Some(dir) => StateStore::open_at(dir)?,
        None => StateStore::open(&config.library.dir)?,
    };

    let mut state = store.load().context("Failed to load state")?;
    // Seed configured devices that are not in state yet
    for (id, seed) in &config.devices {
        state.devices.entry(id.clone()).or_insert_with(|| {
            let name = if seed.name.is_empty() { id.clone() } else { seed.name.clone() };
            let mut device = DeviceState::new(name, &seed.address);
            device.mac = seed.mac.clone();
            device
        });
    }
    store.save(&state)?;

    let activity_path = match &config.storage.activity_db {
        Some(path) => path.clone(),
        None => store
            .path()
            .parent()
            .ok_or_else(|| eyre!("state path has no parent directory"))?
            .join("events.db"),
    };
    let activity = SqliteActivityLog::open(&activity_path)?;

    let state = Arc::new(Mutex::new(state));
    let observers = Observers::new();
    let tagsets = Arc::new(TagsetStore::new(state.clone(), store.clone(), observers.clone()));
    let power = PowerStateCache::new();

    let ctx = Arc::new(SchedulerContext {
        state,
        store,
        tagsets,
        library: Arc::new(library),
        transfer: Arc::new(HttpTransfer::new(config.transfer.port)),
        power: Arc::new(power.clone()),
        activity: Arc::new(activity),
        guard: Arc::new(ExecutionGuard::new()),
        observers,
        windows: config.recency,
        retry_delay: std::time::Duration::from_secs(config.transfer.retry_delay_secs),
    });
    Ok((ctx, power))
}

/// Poll each device's power endpoint and keep the cache fresh.
///
/// The scheduler's power gate reads the cache only; this task is the one
/// place that touches the network for power state.
fn spawn_power_poller(
    ctx: &Arc<SchedulerContext>,
    cache: PowerStateCache,
    port: u16,
) -> tokio::task::JoinHandle<()> {
    let addresses: HashMap<String, String> = ctx
        .state
        .lock()
        .expect("state lock poisoned")
        .devices
        .iter()
        .map(|(id, d)| (id.clone(), d.address.clone()))
        .collect();

    tokio::spawn(async move {
        let client = reqwest::Client::new();
        loop {
            for (device_id, address) in &addresses {
                let url = format!("http://{address}:{port}/api/power");
                match client.get(&url).send().await {
                    Ok(response) if response.status().is_success() => {
                        let body = response.text().await.unwrap_or_default();
                        let state = match body.trim().to_ascii_lowercase().as_str() {
                            "on" => PowerState::On,
                            "off" => PowerState::Off,
                            _ => PowerState::Unknown,
                        };
                        cache.note_power(device_id, state);
                    }
                    Ok(response) => {
                        log::debug!("power poll for {device_id}: HTTP {}", response.status());
                        cache.note_power(device_id, PowerState::Unknown);
                    }
                    Err(e) => {
                        log::debug!("power poll for {device_id} failed: {e}");
                    }
                }
            }
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
        }
    })
}

async fn run_daemon(config: &ArtloopConfig) -> Result<()> {
    let (ctx, power) = build_context(config)?;
    let poller = spawn_power_poller(&ctx, power, config.transfer.port);
    let scheduler = DeviceScheduler::new(ctx);

    let drifted = scheduler
        .restore(Utc::now())
        .map_err(|e| eyre!("failed to restore schedules: {e}"))?;
    for device in &drifted {
        println!("{} {}", "Re-anchored drifted schedule:".yellow(), device);
    }
    println!("{}", "Scheduler running, press Ctrl-C to stop".cyan());

    tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl-C")?;
    println!("{}", "Shutting down...".cyan());
    poller.abort();
    scheduler.shutdown().await;
    Ok(())
}

async fn handle_shuffle(device: &str, config: &ArtloopConfig) -> Result<()> {
    let (ctx, _) = build_context(config)?;
    let scheduler = DeviceScheduler::new(ctx);
    let outcome = scheduler
        .run_once(device)
        .await
        .map_err(|e| eyre!(e.to_string()))?;
    println!("{} {}", "Shuffle:".green(), outcome);
    Ok(())
}

async fn handle_enable(device: &str, config: &ArtloopConfig) -> Result<()> {
    let (ctx, _) = build_context(config)?;
    let scheduler = DeviceScheduler::new(ctx);
    let outcome = scheduler
        .enable(device)
        .await
        .map_err(|e| eyre!(e.to_string()))?;
    println!("{} {}", "Auto shuffle enabled:".green(), outcome);
    Ok(())
}

fn handle_disable(device: &str, config: &ArtloopConfig) -> Result<()> {
    let (ctx, _) = build_context(config)?;
    let scheduler = DeviceScheduler::new(ctx);
    scheduler.disable(device).map_err(|e| eyre!(e.to_string()))?;
    println!("{} {}", "Auto shuffle disabled:".yellow(), device);
    Ok(())
}

fn handle_frequency(device: &str, minutes: u32, config: &ArtloopConfig) -> Result<()> {
    let (ctx, _) = build_context(config)?;
    let scheduler = DeviceScheduler::new(ctx);
    scheduler
        .set_frequency(device, minutes)
        .map_err(|e| eyre!(e.to_string()))?;
    println!("{} {} -> every {} minutes", "Frequency set:".green(), device, minutes);
    Ok(())
}

fn handle_health(device: &str, config: &ArtloopConfig) -> Result<()> {
    let (ctx, _) = build_context(config)?;
    let health = artloop::health::pool_health(&ctx, device).map_err(|e| eyre!(e.to_string()))?;
    println!("{} {}", "Pool health for".cyan(), device);
    println!("  pool size:           {}", health.pool_size);
    println!("  recent here:         {}", health.same_device_recent);
    println!("  recent elsewhere:    {}", health.cross_device_recent);
    println!("  available:           {}", health.available);
    println!("  variety:             {:.1}h", health.variety_hours);
    if health.available == 0 && health.pool_size > 0 {
        println!("{}", "  warning: every eligible image is recent".yellow());
    }
    Ok(())
}

fn handle_devices(config: &ArtloopConfig) -> Result<()> {
    let (ctx, _) = build_context(config)?;
    let state = ctx.state.lock().expect("state lock poisoned");
    if state.devices.is_empty() {
        println!("{}", "No devices configured".yellow());
        return Ok(());
    }
    let now = Utc::now();
    for (id, device) in &state.devices {
        let auto = if device.auto_enabled {
            format!("every {}m", device.frequency_minutes).green()
        } else {
            "off".to_string().yellow()
        };
        println!("{} {} ({}) auto: {}", "Device:".cyan(), id, device.name, auto);
        if let Some(tagset) = state.effective_selection(id, now) {
            println!("  tagset: {tagset}");
        }
        if let Some(next) = device.next_run {
            println!("  next run: {next}");
        }
        if let Some(image) = &device.current_image {
            println!("  showing: {image}");
        }
    }
    Ok(())
}

fn parse_weights(pairs: &[String]) -> Result<std::collections::HashMap<String, f64>> {
    let mut weights = std::collections::HashMap::new();
    for pair in pairs {
        let (category, value) = pair
            .split_once('=')
            .ok_or_else(|| eyre!("weight must be category=value, got '{pair}'"))?;
        let value: f64 = value
            .parse()
            .context(format!("invalid weight value in '{pair}'"))?;
        weights.insert(category.to_string(), value);
    }
    Ok(weights)
}

fn handle_tagset(command: &TagsetCommands, config: &ArtloopConfig) -> Result<()> {
    let (ctx, _) = build_context(config)?;
    match command {
        TagsetCommands::List => {
            let state = ctx.state.lock().expect("state lock poisoned");
            if state.tagsets.is_empty() {
                println!("{}", "No tagsets defined".yellow());
            }
            for (name, tagset) in &state.tagsets {
                println!("{} {}", "Tagset:".cyan(), name);
                if !tagset.include.is_empty() {
                    println!("  include: {}", tagset.include.join(", "));
                }
                if !tagset.exclude.is_empty() {
                    println!("  exclude: {}", tagset.exclude.join(", "));
                }
                for (category, weight) in &tagset.weights {
                    println!("  weight:  {category} = {weight}");
                }
            }
        }
        TagsetCommands::Set {
            name,
            include,
            exclude,
            weights,
        } => {
            let mut tagset = Tagset::with_include(include.clone());
            tagset.exclude = exclude.clone();
            tagset.weights = parse_weights(weights)?;
            ctx.tagsets
                .upsert(name, tagset)
                .map_err(|e| eyre!(e.to_string()))?;
            println!("{} {}", "Tagset saved:".green(), name);
        }
        TagsetCommands::Delete { name } => {
            ctx.tagsets.delete(name).map_err(|e| eyre!(e.to_string()))?;
            println!("{} {}", "Tagset deleted:".red(), name);
        }
        TagsetCommands::Select { device, name } => {
            ctx.tagsets
                .select(device, name.as_deref())
                .map_err(|e| eyre!(e.to_string()))?;
            match name {
                Some(name) => println!("{} {} -> {}", "Selected:".green(), device, name),
                None => println!("{} {}", "Selection cleared:".yellow(), device),
            }
        }
        TagsetCommands::Override {
            device,
            name,
            minutes,
        } => {
            ctx.tagsets
                .set_override(device, name, ChronoDuration::minutes(*minutes))
                .map_err(|e| eyre!(e.to_string()))?;
            println!(
                "{} {} -> {} for {}m",
                "Override:".green(),
                device,
                name,
                minutes
            );
        }
        TagsetCommands::ClearOverride { device } => {
            ctx.tagsets
                .clear_override(device)
                .map_err(|e| eyre!(e.to_string()))?;
            println!("{} {}", "Override cleared:".yellow(), device);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Setup logging first
    setup_logging().context("Failed to setup logging")?;

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = ArtloopConfig::load(cli.config.as_ref()).context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    info!("Starting with config from: {:?}", cli.config);
    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        Commands::Run => run_daemon(&config).await,
        Commands::Shuffle { device } => handle_shuffle(device, &config).await,
        Commands::Health { device } => handle_health(device, &config),
        Commands::Devices => handle_devices(&config),
        Commands::Enable { device } => handle_enable(device, &config).await,
        Commands::Disable { device } => handle_disable(device, &config),
        Commands::Frequency { device, minutes } => handle_frequency(device, *minutes, &config),
        Commands::Tagset { command } => handle_tagset(command, &config),
    }
    .context("Application failed")?;

    Ok(())
}
