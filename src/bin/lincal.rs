use anyhow::{Context, Result, bail};
use chrono::Local;
use lincal::cache::CalendarCache;
use lincal::calendar_config::{CalendarConfig, ModeOverride, SettingsUpdate};
use lincal::cli::{Command, EarliestTime, parse_args, print_help};
use lincal::config::Config;
use lincal::context::{AppContext, SharedContext, StandardContext};
use lincal::model::{EntryDisplayMode, format_time_of_day};
use lincal::parser::load_calendar;
use lincal::store::CalendarConfigStore;
use lincal::system::{DesktopNotifier, Notifier, run_cycle, spawn_driver, spawn_store_watcher};
use std::env;
use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const BINARY_NAME: &str = "lincal";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = match parse_args(env::args().skip(1)) {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            eprintln!("Run '{} --help' for usage.", BINARY_NAME);
            std::process::exit(2);
        }
    };

    if cli.command == Command::Help {
        print_help(BINARY_NAME);
        return Ok(());
    }

    let ctx: SharedContext = Arc::new(StandardContext::new(cli.root.clone()));
    let settings = load_settings(ctx.as_ref())?;
    init_logging(ctx.as_ref(), &settings, cli.command == Command::Daemon)?;

    match cli.command {
        Command::Check(path) => check(&path),
        Command::Add {
            file,
            title,
            earliest,
            force,
        } => add(ctx.as_ref(), &settings, &file, title, earliest, force),
        Command::Remove(id) => {
            let removed = CalendarConfigStore::modify(ctx.as_ref(), |store| Ok(store.remove(id)))?;
            match removed {
                Some(c) => println!("Removed calendar {} '{}'", c.id, c.calendar_title),
                None => bail!("No calendar with id {}", id),
            }
            Ok(())
        }
        Command::List => list(ctx.as_ref()),
        Command::Show(id) => show(ctx.as_ref(), id),
        Command::Enable(id) => set_enabled(ctx.as_ref(), id, true),
        Command::Disable(id) => set_enabled(ctx.as_ref(), id, false),
        Command::Set { id, update } => set(ctx.as_ref(), id, &update),
        Command::Run => deliver_now(ctx.as_ref(), &settings),
        Command::Daemon => daemon(ctx, &settings).await,
        Command::Help => Ok(()),
    }
}

/// Runs one notification cycle and prints what happened.
fn deliver_now(ctx: &dyn AppContext, settings: &Config) -> Result<()> {
    let notifier = DesktopNotifier::new(&settings.notification_app_name);
    let mut cache = CalendarCache::new();
    let report = run_cycle(ctx, &mut cache, &notifier, Local::now().naive_local())?;
    println!("Delivered {} notification(s).", report.delivered);
    for id in &report.disabled {
        println!("Calendar {} could not be loaded and was disabled.", id);
    }
    match report.next_wake {
        Some(t) => println!("Next entry due at {}.", t.format("%d/%m/%Y %H:%M")),
        None => println!("Nothing scheduled."),
    }
    Ok(())
}

/// Loads `config.toml`, writing the defaults on first start so they can be edited.
fn load_settings(ctx: &dyn AppContext) -> Result<Config> {
    match Config::load(ctx) {
        Ok(c) => Ok(c),
        Err(e) if Config::is_missing_config_error(&e) => {
            let defaults = Config::default();
            if let Err(save_err) = defaults.save(ctx) {
                eprintln!("Warning: could not write default settings: {:#}", save_err);
            }
            Ok(defaults)
        }
        Err(e) => Err(e),
    }
}

fn init_logging(ctx: &dyn AppContext, settings: &Config, to_file: bool) -> Result<()> {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(settings.log_level_filter());
    // RUST_LOG wins over the settings file.
    builder.parse_default_env();

    if to_file {
        let path = ctx.get_log_file_path()?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open log file {:?}", path))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    } else {
        builder.target(env_logger::Target::Stderr);
    }

    builder.try_init().context("Failed to initialize logging")?;
    Ok(())
}

fn check(path: &Path) -> Result<()> {
    let calendar = load_calendar(path)?;
    println!(
        "OK: '{}' by {}, version {}, {} entries",
        calendar.title(),
        calendar.author(),
        calendar.version(),
        calendar.len()
    );
    if let (Some(first), Some(last)) = (calendar.entries().first(), calendar.entries().last()) {
        println!("    from {} to {}", first.date_time_str(), last.date_time_str());
    }
    Ok(())
}

fn add(
    ctx: &dyn AppContext,
    settings: &Config,
    file: &Path,
    title: Option<String>,
    earliest: EarliestTime,
    force: bool,
) -> Result<()> {
    let path = fs::canonicalize(file)
        .with_context(|| format!("Calendar file '{}' not found", file.display()))?;
    let calendar = load_calendar(&path)?;
    let file_str = path.to_string_lossy().into_owned();
    let title = title.unwrap_or_else(|| calendar.title().to_string());

    let mut config = CalendarConfig::new(
        0,
        file_str.clone(),
        title.clone(),
        Some(settings.earliest_notification_time()),
    );
    match earliest {
        EarliestTime::Default => {
            config.earliest_notification_time_enabled =
                settings.default_earliest_notification_time_enabled
        }
        EarliestTime::Off => config.earliest_notification_time_enabled = false,
        EarliestTime::At(t) => config.earliest_notification_time = t,
    }

    let id = CalendarConfigStore::modify(ctx, |store| {
        if !force && store.contains_calendar_file(&file_str) {
            bail!(
                "'{}' is already subscribed (use --force to add it again)",
                file_str
            );
        }
        store.add(config)
    })?;
    log::info!("Subscribed to {:?} as calendar {}", path, id);
    println!("Added calendar {} '{}' ({} entries)", id, title, calendar.len());
    // Entries that are already due go out right away.
    deliver_now(ctx, settings)
}

fn set(ctx: &dyn AppContext, id: u32, update: &SettingsUpdate) -> Result<()> {
    let Some(current) = CalendarConfigStore::load(ctx)?.get(id).cloned() else {
        bail!("No calendar with id {}", id);
    };
    // Forced modes can only be checked against a readable calendar.
    let calendar = match load_calendar(Path::new(&current.calendar_file)) {
        Ok(c) => Some(c),
        Err(e) => {
            log::warn!("Cannot check forced display modes: {:#}", e);
            None
        }
    };
    let config = CalendarConfigStore::update_settings(ctx, id, update, calendar.as_ref())?;

    let mode = |m: Option<EntryDisplayMode>| m.map_or(ModeOverride::INHERIT.to_string(), |m| m.to_string());
    if let Some(calendar) = &calendar {
        println!(
            "Effective modes: date {}, description {}",
            config.effective_display_mode_date(calendar),
            config.effective_display_mode_description(calendar)
        );
    }
    let earliest = if config.earliest_notification_time_enabled {
        format_time_of_day(config.earliest_notification_time)
    } else {
        "off".to_string()
    };
    println!(
        "Calendar {} '{}': date mode {}, description mode {}, earliest {}",
        config.id,
        config.calendar_title,
        mode(config.entry_display_mode_date),
        mode(config.entry_display_mode_description),
        earliest
    );
    Ok(())
}

fn list(ctx: &dyn AppContext) -> Result<()> {
    let configs = CalendarConfigStore::load_all(ctx)?;
    if configs.is_empty() {
        println!("No calendars subscribed. Use '{} add <file>'.", BINARY_NAME);
        return Ok(());
    }
    for c in configs {
        let earliest = if c.earliest_notification_time_enabled {
            format_time_of_day(c.earliest_notification_time)
        } else {
            "off".to_string()
        };
        println!(
            "{:>3}  {:<8} {:<24} earliest {:<5} notified {:>3}  {}",
            c.id,
            if c.notifications_enabled { "on" } else { "off" },
            c.calendar_title,
            earliest,
            c.pos,
            c.calendar_file
        );
    }
    Ok(())
}

fn show(ctx: &dyn AppContext, id: u32) -> Result<()> {
    let store = CalendarConfigStore::load(ctx)?;
    let Some(config) = store.get(id) else {
        bail!("No calendar with id {}", id);
    };
    let calendar = load_calendar(Path::new(&config.calendar_file))?;
    let now = Local::now().naive_local();

    println!("{} ({})", config.calendar_title, calendar.title());
    println!(
        "by {}, version {}, dated {}",
        calendar.author(),
        calendar.version(),
        calendar.date_str()
    );
    println!("{}", calendar.description());
    println!();

    for (index, entry) in calendar.entries().iter().enumerate() {
        let marker = if index < config.pos { '*' } else { ' ' };
        let date = if config.shows_date(&calendar, entry, now) {
            entry.date_time_str()
        } else {
            "??/??/???? ??:??".to_string()
        };
        let text = if config.shows_description(&calendar, entry, now) {
            entry.summary_text()
        } else {
            "(hidden)"
        };
        println!("{} {:>3}  {}  {}", marker, index, date, text);
        if entry.description.is_some() && config.shows_link(&calendar, entry, now) {
            println!("         {}", entry.link);
        }
    }
    Ok(())
}

fn set_enabled(ctx: &dyn AppContext, id: u32, enabled: bool) -> Result<()> {
    CalendarConfigStore::modify(ctx, |store| {
        let Some(config) = store.get_mut(id) else {
            bail!("No calendar with id {}", id);
        };
        config.notifications_enabled = enabled;
        Ok(())
    })?;
    println!(
        "Notifications {} for calendar {}",
        if enabled { "enabled" } else { "disabled" },
        id
    );
    Ok(())
}

async fn daemon(ctx: SharedContext, settings: &Config) -> Result<()> {
    let notifier: Arc<dyn Notifier> =
        Arc::new(DesktopNotifier::new(&settings.notification_app_name));
    let max_sleep = Duration::from_secs(u64::from(settings.max_sleep_mins.max(1)) * 60);

    let poll = Duration::from_secs(u64::from(settings.store_poll_secs.max(1)));

    log::info!("Starting notification driver (max sleep {:?})", max_sleep);
    let (tx, handle) = spawn_driver(Arc::clone(&ctx), notifier, max_sleep);
    let watcher = spawn_store_watcher(ctx, tx.downgrade(), poll);

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    log::info!("Shutting down");
    drop(tx);
    handle.await.context("Notification driver failed")?;
    watcher.await.context("Store watcher failed")?;
    Ok(())
}
