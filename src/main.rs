//! Geofence Session Agent CLI
//!
//! Records activity sessions from region enter/exit events.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use clap::{Parser, Subcommand, ValueEnum};
use geofence_session_agent::{
    config::Config,
    core::{
        load_regions, select_for_monitoring, weekly_stats, ConflictPolicy, Coordinates,
        JsonFileDirectory, OfflineDirectory, Session, SessionTracker, SyncStatus, TrackableRegion,
        TrackerOptions, Transition,
    },
    router::{ProximityRouter, DEFAULT_QUEUE_CAPACITY},
    source::{
        LocationPermission, MonitorConfig, MonitorError, ProximityEvent, RegionMonitor,
        PROXIMITY_RADIUS_METERS, REGION_SEARCH_RADIUS_KM,
    },
    store::{FileBackend, LockError, StateLock, StateStore},
    transparency::{create_shared_log_with_persistence, PersistedStats},
    LOCATION_DECLARATION, VERSION,
};
use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[cfg(feature = "gateway")]
use geofence_session_agent::{BlockingGatewayClient, GatewayConfig};

#[derive(Parser)]
#[command(name = "geofence-session")]
#[command(version = VERSION)]
#[command(about = "Activity sessions from geofence enter/exit events", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start monitoring nearby regions
    Start {
        /// Device latitude (falls back to the configured position)
        #[arg(long, requires = "lng", allow_negative_numbers = true)]
        lat: Option<f64>,

        /// Device longitude (falls back to the configured position)
        #[arg(long, requires = "lat", allow_negative_numbers = true)]
        lng: Option<f64>,

        /// Read proximity events as JSON lines from stdin
        #[arg(long)]
        stdin: bool,

        /// Accept proximity events over HTTP (requires server feature)
        #[arg(long)]
        serve: bool,

        /// HTTP port when serving (0 picks a free port)
        #[arg(long, default_value = "0")]
        port: u16,

        /// Close the open session when another region is entered
        #[arg(long)]
        replace_on_conflict: bool,

        /// Enable health gateway sync (requires gateway feature)
        #[arg(long)]
        gateway: bool,

        /// Gateway port (auto-detected from runtime dir if not specified)
        #[arg(long)]
        gateway_port: Option<u16>,

        /// Gateway token (auto-detected from runtime dir if not specified)
        #[arg(long)]
        gateway_token: Option<String>,
    },

    /// Pause region monitoring
    Pause,

    /// Resume region monitoring
    Resume,

    /// Show the open session and tracker statistics
    Status,

    /// Open a session at a region without a proximity event
    Checkin {
        /// Region id
        #[arg(long)]
        region: String,
    },

    /// Close the open session
    Checkout,

    /// List recorded sessions, most recent first
    History {
        /// Maximum number of sessions to show
        #[arg(long, short, default_value = "20")]
        limit: usize,
    },

    /// Show the last 7 days of activity
    Stats,

    /// List known regions
    Regions {
        /// Latitude to measure distances from
        #[arg(long, requires = "lng", allow_negative_numbers = true)]
        lat: Option<f64>,

        /// Longitude to measure distances from
        #[arg(long, requires = "lat", allow_negative_numbers = true)]
        lng: Option<f64>,
    },

    /// Retry health sync for sessions still pending
    Sync {
        /// Gateway port (auto-detected from runtime dir if not specified)
        #[arg(long)]
        gateway_port: Option<u16>,

        /// Gateway token (auto-detected from runtime dir if not specified)
        #[arg(long)]
        gateway_token: Option<String>,
    },

    /// Grant or revoke location access for monitoring
    Location {
        #[arg(value_enum)]
        access: LocationAccess,
    },

    /// Show configuration
    Config,

    /// Display the location declaration
    Declaration,
}

#[derive(Clone, Copy, ValueEnum)]
enum LocationAccess {
    Grant,
    Deny,
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Start {
            lat,
            lng,
            stdin,
            serve,
            port,
            replace_on_conflict,
            gateway,
            gateway_port,
            gateway_token,
        } => {
            let position = lat.zip(lng).map(|(lat, lng)| Coordinates::new(lat, lng));
            cmd_start(StartOptions {
                position,
                stdin,
                serve,
                port,
                replace_on_conflict,
                gateway,
                gateway_port,
                gateway_token,
            });
        }
        Commands::Pause => cmd_pause(),
        Commands::Resume => cmd_resume(),
        Commands::Status => cmd_status(),
        Commands::Checkin { region } => cmd_checkin(&region),
        Commands::Checkout => cmd_checkout(),
        Commands::History { limit } => cmd_history(limit),
        Commands::Stats => cmd_stats(),
        Commands::Regions { lat, lng } => {
            cmd_regions(lat.zip(lng).map(|(lat, lng)| Coordinates::new(lat, lng)))
        }
        Commands::Sync {
            gateway_port,
            gateway_token,
        } => cmd_sync(gateway_port, gateway_token),
        Commands::Location { access } => cmd_location(access),
        Commands::Config => cmd_config(),
        Commands::Declaration => println!("{LOCATION_DECLARATION}"),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg_attr(not(feature = "server"), allow(dead_code))]
struct StartOptions {
    position: Option<Coordinates>,
    stdin: bool,
    serve: bool,
    port: u16,
    replace_on_conflict: bool,
    gateway: bool,
    gateway_port: Option<u16>,
    gateway_token: Option<String>,
}

#[allow(unused_variables, unused_mut)]
fn cmd_start(opts: StartOptions) {
    println!("Geofence Session Agent v{VERSION}");
    println!();

    let config = Config::load().unwrap_or_default();
    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }
    let tz = config.tz();

    let Some(position) = opts.position.or(config.position) else {
        eprintln!("Error: No position known. Pass --lat/--lng or set `position` in the config.");
        std::process::exit(1);
    };

    if !opts.stdin && !opts.serve {
        eprintln!("Error: No event source. Use --stdin and/or --serve.");
        std::process::exit(1);
    }

    let regions = region_set(&config);
    let (store, _state_lock) = lock_store(&config);
    let transparency_log = create_shared_log_with_persistence(config.transparency_path());

    let options = TrackerOptions {
        body_mass_kg: config.body_mass_kg(),
        conflict_policy: if opts.replace_on_conflict {
            ConflictPolicy::ReplaceOpen
        } else {
            ConflictPolicy::IgnoreNew
        },
    };
    let mut tracker = SessionTracker::restore(store.clone(), options)
        .with_transparency_log(transparency_log.clone())
        .with_regions(regions.clone());

    println!("Starting tracker...");
    println!("  Position: {:.4}, {:.4}", position.latitude, position.longitude);
    println!("  Known regions: {}", regions.len());
    println!("  Proximity radius: {PROXIMITY_RADIUS_METERS} m");
    println!("  Body mass: {} kg", config.body_mass_kg());
    println!(
        "  Conflict policy: {}",
        if opts.replace_on_conflict {
            "replace open session"
        } else {
            "keep open session"
        }
    );

    #[cfg(feature = "gateway")]
    if opts.gateway {
        match create_gateway_client(&config, opts.gateway_port, opts.gateway_token.clone()) {
            Ok(client) => {
                println!("  Health sync: enabled");
                println!("  Device ID: {}", client.device_id());
                match client.test_connection() {
                    Ok(true) => println!("  Gateway connection: OK"),
                    Ok(false) => eprintln!("Warning: Gateway health check failed"),
                    Err(e) => eprintln!("Warning: Could not connect to gateway: {e}"),
                }
                tracker = tracker.with_sink(Box::new(client));
            }
            Err(e) => {
                eprintln!("Warning: Gateway initialization failed: {e}");
                eprintln!("Continuing without health sync.");
            }
        }
    } else {
        println!("  Health sync: disabled");
    }

    #[cfg(not(feature = "gateway"))]
    if opts.gateway {
        eprintln!("Warning: --gateway flag ignored (gateway feature not enabled at compile time)");
    }

    let keep = tracker.active_session().map(|s| s.region_id.clone());
    if let Some(session) = tracker.active_session() {
        println!(
            "  Resumed session at {} (since {})",
            session.region_label,
            local_time(session.start, tz)
        );
    }

    let (router, handle) = ProximityRouter::new(tracker, DEFAULT_QUEUE_CAPACITY);
    let mut router = router.with_observer(move |t| print_transition(t, tz));

    let monitor = Arc::new(RegionMonitor::new(
        MonitorConfig {
            max_regions: config.max_monitored_regions,
            permission: config.location_permission,
            ..MonitorConfig::default()
        },
        handle,
    ));

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone());

    if config.paused {
        println!();
        println!("Monitoring is currently paused.");
        println!("Run `geofence-session resume` to start monitoring.");
    } else if let Err(e) = start_monitor(&monitor, &position, &regions, keep.as_deref()) {
        eprintln!("Error: {e}.");
        eprintln!("Run `geofence-session location grant` to allow monitoring.");
        std::process::exit(1);
    }

    // Server
    #[cfg(feature = "server")]
    let mut server = None;
    #[cfg(feature = "server")]
    if opts.serve {
        match start_server(opts.port, monitor.clone(), store.clone()) {
            Ok(s) => server = Some(s),
            Err(e) => {
                eprintln!("Error starting server: {e}");
                std::process::exit(1);
            }
        }
    }
    #[cfg(not(feature = "server"))]
    if opts.serve {
        eprintln!("Warning: --serve flag ignored (server feature not enabled at compile time)");
        if !opts.stdin {
            std::process::exit(1);
        }
    }

    if opts.stdin {
        spawn_stdin_reader(monitor.clone(), running.clone(), !opts.serve);
    }

    spawn_config_watcher(monitor.clone(), running.clone(), &config, position, regions);

    println!();
    println!("Press Ctrl+C to stop");
    println!();

    router.run(&running);
    router.drain();

    println!();
    println!("Stopping monitoring...");
    monitor.stop();

    #[cfg(feature = "server")]
    if let Some((runtime, shutdown_tx)) = server {
        let _ = shutdown_tx.send(());
        runtime.shutdown_timeout(Duration::from_secs(2));
    }

    if let Some(session) = router.tracker().active_session() {
        println!(
            "Session at {} stays open and will resume on next start.",
            session.region_label
        );
    }

    if let Err(e) = transparency_log.save() {
        eprintln!("Warning: Could not save transparency log: {e}");
    }

    println!();
    println!("{}", transparency_log.summary());
}

fn start_monitor(
    monitor: &RegionMonitor,
    position: &Coordinates,
    regions: &[TrackableRegion],
    keep: Option<&str>,
) -> Result<(), MonitorError> {
    match monitor.start(position, regions, keep) {
        Ok(count) => println!("  Monitoring {count} region(s)"),
        Err(MonitorError::PermissionDenied) => return Err(MonitorError::PermissionDenied),
        Err(MonitorError::AlreadyRunning) => {}
        Err(MonitorError::NoRegions) => {
            eprintln!(
                "Warning: No regions within {REGION_SEARCH_RADIUS_KM} km; only manual check-ins will work."
            );
        }
    }
    Ok(())
}

/// Feed JSON-lines events from stdin to the monitor.
fn spawn_stdin_reader(monitor: Arc<RegionMonitor>, running: Arc<AtomicBool>, stop_on_eof: bool) {
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    tracing::warn!("Failed to read stdin: {e}");
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ProximityEvent>(&line) {
                Ok(event) => {
                    if let Err(e) = monitor.deliver(event) {
                        tracing::warn!("Event not delivered: {e}");
                    }
                }
                Err(e) => tracing::warn!("Malformed event line: {e}"),
            }
        }
        if stop_on_eof {
            tracing::debug!("Input closed");
            running.store(false, Ordering::SeqCst);
        }
    });
}

/// Poll the config file so `pause`/`resume` and `location` can control a running agent.
fn spawn_config_watcher(
    monitor: Arc<RegionMonitor>,
    running: Arc<AtomicBool>,
    config: &Config,
    position: Coordinates,
    regions: Vec<TrackableRegion>,
) {
    let mut paused = config.paused;
    let mut permission = config.location_permission;

    thread::spawn(move || {
        while running.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_secs(1));
            let Ok(cfg) = Config::load() else {
                continue;
            };
            if cfg.paused == paused && cfg.location_permission == permission {
                continue;
            }
            paused = cfg.paused;
            permission = cfg.location_permission;
            monitor.set_permission(permission);

            if permission == LocationPermission::Denied {
                println!();
                println!("Location access revoked, monitoring stopped.");
            } else if paused {
                println!();
                println!("Pausing monitoring...");
                monitor.stop();
            } else if !monitor.is_running() {
                println!();
                println!("Resuming monitoring...");
                let keep = monitor
                    .handle()
                    .active_session()
                    .ok()
                    .and_then(|rx| rx.blocking_recv().ok())
                    .flatten()
                    .map(|s| s.region_id);
                if let Err(e) = start_monitor(&monitor, &position, &regions, keep.as_deref()) {
                    eprintln!("Warning: {e}");
                }
            }
        }
    });
}

#[cfg(feature = "server")]
fn start_server(
    port: u16,
    monitor: Arc<RegionMonitor>,
    store: StateStore,
) -> anyhow::Result<(tokio::runtime::Runtime, tokio::sync::oneshot::Sender<()>)> {
    use geofence_session_agent::server::{run, ServerConfig, ServerState};

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()?;
    let (addr, shutdown_tx) = runtime.block_on(run(
        ServerConfig::new(port),
        ServerState::new(monitor, store),
    ))?;
    println!("  Listening on http://{addr}");
    Ok((runtime, shutdown_tx))
}

fn cmd_pause() {
    let mut config = Config::load().unwrap_or_default();
    config.paused = true;
    if let Err(e) = config.save() {
        eprintln!("Error saving config: {e}");
        std::process::exit(1);
    }
    println!("Monitoring paused. Use 'geofence-session resume' to continue.");
    println!("An open session is kept and closes on the next exit or checkout.");
}

fn cmd_resume() {
    let mut config = Config::load().unwrap_or_default();
    config.paused = false;
    if let Err(e) = config.save() {
        eprintln!("Error saving config: {e}");
        std::process::exit(1);
    }
    println!("Monitoring resumed.");
}

fn cmd_location(access: LocationAccess) {
    let mut config = Config::load().unwrap_or_default();
    config.location_permission = match access {
        LocationAccess::Grant => LocationPermission::Granted,
        LocationAccess::Deny => LocationPermission::Denied,
    };
    if let Err(e) = config.save() {
        eprintln!("Error saving config: {e}");
        std::process::exit(1);
    }
    match config.location_permission {
        LocationPermission::Granted => println!("Location access granted."),
        LocationPermission::Denied => {
            println!("Location access denied. Monitoring stops; an open session is kept.")
        }
    }
}

fn cmd_status() {
    let config = Config::load().unwrap_or_default();
    let tz = config.tz();
    let store = open_store(&config);

    println!("Geofence Session Agent Status");
    println!("=============================");
    println!();

    println!(
        "Location Permission: {}",
        match config.location_permission {
            LocationPermission::Granted => "Granted ✓",
            LocationPermission::Denied => "Not Granted ✗",
        }
    );
    println!("Paused: {}", config.paused);
    println!();

    match store.load_active() {
        Ok(Some(session)) => {
            let elapsed = session.duration_until(Utc::now());
            println!("Open session:");
            println!("  Region: {} ({})", session.region_label, session.activity_type);
            println!("  Since: {}", local_time(session.start, tz));
            println!("  Elapsed: {} min", elapsed.num_minutes());
        }
        Ok(None) => println!("No open session."),
        Err(e) => eprintln!("Error reading session state: {e}"),
    }

    match store.pending_sync() {
        Ok(pending) if !pending.is_empty() => {
            println!("Sessions awaiting health sync: {}", pending.len());
        }
        Ok(_) => {}
        Err(e) => eprintln!("Error reading history: {e}"),
    }
    println!();

    let stats_path = config.transparency_path();
    let persisted = std::fs::read_to_string(&stats_path)
        .ok()
        .and_then(|content| serde_json::from_str::<PersistedStats>(&content).ok());
    match persisted {
        Some(stats) => {
            println!("Cumulative Statistics:");
            println!("  Events received: {}", stats.events_received);
            println!("  Events ignored: {}", stats.events_ignored);
            println!("  Sessions opened: {}", stats.sessions_opened);
            println!("  Sessions recorded: {}", stats.sessions_finalized);
            println!("  Visits discarded: {}", stats.sessions_discarded);
            println!(
                "  Health syncs: {} ok, {} failed",
                stats.syncs_succeeded, stats.syncs_failed
            );
        }
        None => println!("No previous tracker data found."),
    }
}

fn cmd_checkin(region_id: &str) {
    let config = Config::load().unwrap_or_default();
    let (mut tracker, _state_lock) = offline_tracker(&config);

    let result = tracker.start_manual_session(region_id, Utc::now());
    close_tracker(tracker);
    match result {
        Ok(session) => println!(
            "Checked in at {} ({}) at {}",
            session.region_label,
            session.activity_type,
            local_time(session.start, config.tz())
        ),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

fn cmd_checkout() {
    let config = Config::load().unwrap_or_default();
    let (mut tracker, _state_lock) = offline_tracker(&config);

    let result = tracker.end_manual_session(Utc::now());
    close_tracker(tracker);
    match result {
        Ok(transition) => {
            print_transition(&transition, config.tz());
            if matches!(transition, Transition::Finalized(_)) {
                println!("Run 'geofence-session sync' to push it to the health gateway.");
            }
        }
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

fn cmd_history(limit: usize) {
    let config = Config::load().unwrap_or_default();
    let tz = config.tz();
    let history = match open_store(&config).history() {
        Ok(history) => history,
        Err(e) => {
            eprintln!("Error reading history: {e}");
            std::process::exit(1);
        }
    };

    if history.is_empty() {
        println!("No sessions recorded yet.");
        return;
    }

    println!("Showing {} of {} session(s)", history.len().min(limit), history.len());
    println!();
    for session in history.iter().take(limit) {
        print_session_line(session, tz);
    }
}

fn cmd_stats() {
    let config = Config::load().unwrap_or_default();
    let history = match open_store(&config).history() {
        Ok(history) => history,
        Err(e) => {
            eprintln!("Error reading history: {e}");
            std::process::exit(1);
        }
    };
    let stats = weekly_stats(&history, Utc::now());

    println!("Last 7 Days");
    println!("===========");
    println!("  Sessions: {}", stats.session_count);
    println!("  Total time: {} min", stats.total_minutes);
    println!("  Average session: {:.1} min", stats.average_minutes);
    println!("  Energy: {} kcal", stats.total_energy);
    println!(
        "  Favorite place: {}",
        stats.favorite_region.as_deref().unwrap_or("-")
    );
}

fn cmd_regions(position: Option<Coordinates>) {
    let config = Config::load().unwrap_or_default();
    let regions = region_set(&config);
    let position = position.or(config.position);

    let Some(position) = position else {
        for region in &regions {
            println!("{:<12} {:<28} {}", region.id, region.label, region.activity_type);
        }
        return;
    };

    let monitored = select_for_monitoring(
        &position,
        &regions,
        REGION_SEARCH_RADIUS_KM,
        config.max_monitored_regions,
    );

    let mut rows: Vec<_> = regions
        .iter()
        .map(|r| (position.distance_km(&r.coordinates), r))
        .collect();
    rows.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.id.cmp(&b.1.id)));

    for (distance, region) in rows {
        let mark = if monitored.iter().any(|m| m.id == region.id) {
            "*"
        } else {
            " "
        };
        println!(
            "{mark} {:<12} {:<28} {:<12} {:>7.2} km",
            region.id, region.label, region.activity_type, distance
        );
    }
    println!();
    println!("* monitored from this position ({PROXIMITY_RADIUS_METERS} m geofence radius)");
}

#[allow(unused_variables)]
fn cmd_sync(gateway_port: Option<u16>, gateway_token: Option<String>) {
    #[cfg(feature = "gateway")]
    {
        let config = Config::load().unwrap_or_default();
        let client = match create_gateway_client(&config, gateway_port, gateway_token) {
            Ok(client) => client,
            Err(e) => {
                eprintln!("Error: Gateway initialization failed: {e}");
                std::process::exit(1);
            }
        };

        let (tracker, _state_lock) = offline_tracker(&config);
        let mut tracker = tracker.with_sink(Box::new(client));
        let result = tracker.sync_pending();
        close_tracker(tracker);
        match result {
            Ok(report) if report.attempted == 0 => println!("Nothing to sync."),
            Ok(report) => println!(
                "Synced {} of {} session(s), {} failed",
                report.synced, report.attempted, report.failed
            ),
            Err(e) => {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
        }
    }

    #[cfg(not(feature = "gateway"))]
    {
        eprintln!("Error: health sync requires the gateway feature");
        std::process::exit(1);
    }
}

fn cmd_config() {
    let config = Config::load().unwrap_or_default();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).unwrap_or_else(|_| "Error".to_string())
    );
}

fn open_store(config: &Config) -> StateStore {
    StateStore::new(Arc::new(FileBackend::new(config.state_path())))
}

fn region_set(config: &Config) -> Vec<TrackableRegion> {
    match config.regions_path {
        Some(ref path) => load_regions(&JsonFileDirectory::new(path)),
        None => load_regions(&OfflineDirectory),
    }
}

/// Take the state directory for this process, or exit if another process holds it.
fn lock_store(config: &Config) -> (StateStore, StateLock) {
    match StateStore::open_exclusive(&config.state_path()) {
        Ok(locked) => locked,
        Err(e @ LockError::Held { .. }) => {
            eprintln!("Error: {e}.");
            eprintln!(
                "A running agent owns the session state. Stop it, or use its HTTP /checkin and /checkout endpoints."
            );
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

/// Tracker over the durable store for one-shot commands.
///
/// The returned lock must outlive the tracker.
fn offline_tracker(config: &Config) -> (SessionTracker, StateLock) {
    let (store, lock) = lock_store(config);
    let options = TrackerOptions {
        body_mass_kg: config.body_mass_kg(),
        ..TrackerOptions::default()
    };
    let tracker = SessionTracker::restore(store, options)
        .with_transparency_log(create_shared_log_with_persistence(config.transparency_path()))
        .with_regions(region_set(config));
    (tracker, lock)
}

fn close_tracker(tracker: SessionTracker) {
    if let Err(e) = tracker.finish() {
        eprintln!("Warning: Could not save transparency log: {e}");
    }
}

fn local_time(at: DateTime<Utc>, tz: Tz) -> String {
    at.with_timezone(&tz).format("%Y-%m-%d %H:%M").to_string()
}

fn print_session_line(session: &Session, tz: Tz) {
    println!(
        "{}  {:<28} {:<12} {:>4} min  {:>5} kcal  {}",
        local_time(session.start, tz),
        session.region_label,
        session.activity_type,
        session.duration().num_minutes(),
        session.estimated_energy.unwrap_or(0),
        match session.sync_status {
            SyncStatus::Synced => "synced",
            SyncStatus::Pending => "pending",
        }
    );
}

fn print_transition(transition: &Transition, tz: Tz) {
    let now = Utc::now().with_timezone(&tz).format("%H:%M:%S");
    match transition {
        Transition::Opened(session) => println!(
            "[{now}] Session opened at {} ({})",
            session.region_label, session.activity_type
        ),
        Transition::Finalized(session) => println!(
            "[{now}] Session recorded: {} for {} min, ~{} kcal",
            session.region_label,
            session.duration().num_minutes(),
            session.estimated_energy.unwrap_or(0)
        ),
        Transition::Discarded { session, duration } => println!(
            "[{now}] Visit to {} discarded ({} min is too short)",
            session.region_label,
            duration.num_minutes()
        ),
        Transition::Replaced { closed, opened } => {
            print_transition(closed, tz);
            print_transition(&Transition::Opened(opened.clone()), tz);
        }
        Transition::ReplaceFailed { closed, reason } => {
            print_transition(closed, tz);
            eprintln!("[{now}] Warning: new session not opened: {reason}");
        }
        Transition::Ignored(reason) => tracing::debug!(?reason, "Event ignored"),
        Transition::Dropped(reason) => eprintln!("[{now}] Warning: event dropped: {reason}"),
    }
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) {
    if let Err(e) = ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    }) {
        eprintln!("Warning: Could not set Ctrl+C handler: {e}");
    }
}

/// Create gateway client from CLI args or runtime directory.
#[cfg(feature = "gateway")]
fn create_gateway_client(
    config: &Config,
    port: Option<u16>,
    token: Option<String>,
) -> Result<BlockingGatewayClient, geofence_session_agent::GatewayError> {
    let gateway_config = match (port, token) {
        (Some(p), Some(t)) => GatewayConfig::new("127.0.0.1", p, t),
        (port, token) => {
            if port.is_some() || token.is_some() {
                eprintln!("Warning: Partial gateway config provided, trying runtime directory...");
            }
            GatewayConfig::from_runtime_dir()?
        }
    };

    Ok(
        BlockingGatewayClient::new(gateway_config.with_timeout(config.sync_timeout))?
            .with_timezone(config.tz()),
    )
}
