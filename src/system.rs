// File: ./src/system.rs
// The notification driver: runs scan cycles over all subscribed calendars,
// hands due entries to a `Notifier`, and sleeps until the next one is due.
use crate::cache::CalendarCache;
use crate::calendar_config::CalendarConfig;
use crate::context::{AppContext, SharedContext};
use crate::model::{CEntry, Calendar};
use crate::scheduler::{global_next_wake, scan};
use crate::store::CalendarConfigStore;
use anyhow::{Context, Result};
use chrono::{Local, NaiveDateTime, TimeDelta};
use notify_rust::Notification;
use std::collections::HashSet;
use std::fs;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::mpsc::{self, WeakSender};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant, MissedTickBehavior, interval, sleep_until};

/// Delay before a cycle retries an entry whose notification could not be shown.
const RETRY_DELAY_MINS: i64 = 1;

/// What a notifier needs to show one entry.
#[derive(Debug, Clone, Copy)]
pub struct EntryNotification<'a> {
    /// Stable per calendar and entry index, so a redelivered entry replaces its earlier copy.
    pub id: u64,
    pub calendar_id: u32,
    pub calendar_title: &'a str,
    pub index: usize,
    pub entry: &'a CEntry,
}

/// Calendar id in the high half, entry index in the low half. Indexes beyond
/// `u32::MAX` share the last slot.
pub fn notification_id(calendar_id: u32, index: usize) -> u64 {
    let index = u32::try_from(index).unwrap_or(u32::MAX);
    (u64::from(calendar_id) << 32) | u64::from(index)
}

pub trait Notifier: Send + Sync {
    fn notify_entry(&self, notification: &EntryNotification<'_>) -> Result<()>;

    /// Reports a problem that needs the user's attention, such as a calendar
    /// that stopped parsing.
    fn notify_error(&self, title: &str, message: &str) -> Result<()>;
}

/// Shows notifications through the desktop's notification service.
#[derive(Debug, Clone)]
pub struct DesktopNotifier {
    app_name: String,
}

impl DesktopNotifier {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
        }
    }
}

impl Notifier for DesktopNotifier {
    fn notify_entry(&self, n: &EntryNotification<'_>) -> Result<()> {
        let body = match &n.entry.description {
            Some(d) if !d.is_empty() => format!("{}\n{}", d, n.entry.link),
            _ => n.entry.link.clone(),
        };
        Notification::new()
            .summary(n.calendar_title)
            .body(&body)
            .appname(&self.app_name)
            .show()
            .with_context(|| format!("Failed to show notification {}", n.id))?;
        Ok(())
    }

    fn notify_error(&self, title: &str, message: &str) -> Result<()> {
        Notification::new()
            .summary(title)
            .body(message)
            .appname(&self.app_name)
            .show()
            .context("Failed to show error notification")?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub delivered: usize,
    /// Calendars whose notifications were switched off because they failed to load.
    pub disabled: Vec<u32>,
    pub next_wake: Option<NaiveDateTime>,
}

/// Runs one notification cycle over every subscribed calendar.
///
/// The store lock is held for the whole cycle. Entries are delivered before
/// the advanced cursors are saved, so a crash mid-cycle redelivers rather than
/// drops notifications.
pub fn run_cycle(
    ctx: &dyn AppContext,
    cache: &mut CalendarCache,
    notifier: &dyn Notifier,
    now: NaiveDateTime,
) -> Result<CycleReport> {
    CalendarConfigStore::modify(ctx, |store| {
        let ids: HashSet<u32> = store.entries().iter().map(|c| c.id).collect();
        cache.retain(&ids);

        let mut report = CycleReport::default();
        let mut wakes = Vec::new();

        for config in store.entries_mut() {
            if !config.notifications_enabled {
                continue;
            }
            let calendar = match cache.get(config) {
                Ok(c) => c,
                Err(e) => {
                    log::warn!(
                        "Disabling notifications for calendar {} ('{}'): {:#}",
                        config.id,
                        config.calendar_title,
                        e
                    );
                    config.notifications_enabled = false;
                    report.disabled.push(config.id);
                    let title = format!("Calendar '{}' disabled", config.calendar_title);
                    if let Err(ne) = notifier.notify_error(&title, &format!("{:#}", e)) {
                        log::warn!("Could not report load failure: {:#}", ne);
                    }
                    continue;
                }
            };

            let (delivered, next) = process_calendar(&calendar, config, notifier, now);
            report.delivered += delivered;
            wakes.push(next);
        }

        report.next_wake = global_next_wake(wakes);
        log::debug!(
            "Cycle at {} delivered {} notification(s), next wake {:?}",
            now,
            report.delivered,
            report.next_wake
        );
        Ok(report)
    })
}

/// Delivers the due batch of one calendar and advances its cursor past every
/// entry that was delivered. Returns the delivered count and the calendar's next wake.
fn process_calendar(
    calendar: &Calendar,
    config: &mut CalendarConfig,
    notifier: &dyn Notifier,
    now: NaiveDateTime,
) -> (usize, Option<NaiveDateTime>) {
    let result = scan(calendar, config, now);
    let mut delivered = 0;

    for (index, entry) in result.indexed_due() {
        let notification = EntryNotification {
            id: notification_id(config.id, index),
            calendar_id: config.id,
            calendar_title: &config.calendar_title,
            index,
            entry,
        };
        if let Err(e) = notifier.notify_entry(&notification) {
            log::error!(
                "Calendar {}: delivering entry {} failed, will retry: {:#}",
                config.id,
                index,
                e
            );
            config.pos = index;
            return (delivered, Some(now + TimeDelta::minutes(RETRY_DELAY_MINS)));
        }
        delivered += 1;
    }

    if delivered > 0 {
        log::info!(
            "Calendar {} ('{}'): notified {} entr{}",
            config.id,
            config.calendar_title,
            delivered,
            if delivered == 1 { "y" } else { "ies" }
        );
    }
    config.pos = result.new_pos;
    (delivered, result.next_wake)
}

#[derive(Debug, Clone)]
pub enum DriverMessage {
    /// Run a cycle now, e.g. after a calendar was added or its settings changed.
    Rescan,
}

/// Spawns the background notification driver.
/// Returns the sender used to poke it; the driver stops once every sender is dropped.
pub fn spawn_driver(
    ctx: SharedContext,
    notifier: Arc<dyn Notifier>,
    max_sleep: Duration,
) -> (mpsc::Sender<DriverMessage>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel(10);

    let handle = tokio::spawn(async move {
        let mut cache = CalendarCache::new();

        loop {
            let cycle_ctx = Arc::clone(&ctx);
            let cycle_notifier = Arc::clone(&notifier);
            let joined = tokio::task::spawn_blocking(move || {
                let now = Local::now().naive_local();
                let report = run_cycle(cycle_ctx.as_ref(), &mut cache, cycle_notifier.as_ref(), now);
                (cache, report, now)
            })
            .await;

            let (returned, report, now) = match joined {
                Ok(out) => out,
                Err(e) => {
                    log::error!("Notification cycle panicked: {}", e);
                    break;
                }
            };
            cache = returned;

            let next_wake = match report {
                Ok(r) => r.next_wake,
                Err(e) => {
                    log::error!("Notification cycle failed: {:#}", e);
                    None
                }
            };

            // Capped so that wall-clock jumps (suspend, DST) are noticed.
            let duration = next_wake
                .and_then(|t| (t - now).to_std().ok())
                .unwrap_or(max_sleep)
                .min(max_sleep);
            let deadline = Instant::now() + duration;

            tokio::select! {
                _ = sleep_until(deadline) => {}
                msg = rx.recv() => match msg {
                    Some(DriverMessage::Rescan) => log::debug!("Rescan requested"),
                    None => break,
                }
            }
        }
        log::debug!("Notification driver stopped");
    });

    (tx, handle)
}

/// Size and modification time of the store file; `None` while it does not exist.
fn store_fingerprint(ctx: &dyn AppContext) -> Option<(u64, SystemTime)> {
    let path = ctx.get_calendar_store_path().ok()?;
    let meta = fs::metadata(path).ok()?;
    Some((meta.len(), meta.modified().ok()?))
}

/// Polls the calendar store and asks the driver to rescan whenever another
/// process (e.g. `lincal add`) changed it. Stops once the driver is gone.
pub fn spawn_store_watcher(
    ctx: SharedContext,
    tx: WeakSender<DriverMessage>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut last = store_fingerprint(ctx.as_ref());
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let Some(sender) = tx.upgrade() else {
                break;
            };
            let current = store_fingerprint(ctx.as_ref());
            if current != last {
                last = current;
                log::debug!("Calendar store changed, requesting rescan");
                if sender.send(DriverMessage::Rescan).await.is_err() {
                    break;
                }
            }
        }
        log::debug!("Store watcher stopped");
    })
}
