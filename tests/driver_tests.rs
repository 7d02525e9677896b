// Tests for notification cycles and the background driver.
use anyhow::{Result, bail};
use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use lincal::cache::CalendarCache;
use lincal::calendar_config::CalendarConfig;
use lincal::context::{AppContext, SharedContext, TestContext};
use lincal::store::CalendarConfigStore;
use lincal::system::{
    DriverMessage, EntryNotification, Notifier, run_cycle, spawn_driver, spawn_store_watcher,
};
use std::fs;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const ADVENT: &str = "@title Advent\n@author Santa\n@descr d\n@version 1\n@date 1/12/2020\n@begin\n\
                      @d 1/12/2020\n@st 8:00\na1\na2\na3\n";
const EVENINGS: &str = "@title Evenings\n@author Moon\n@descr d\n@version 1\n@date 1/12/2020\n@begin\n\
                        @d 1/12/2020\n@t 18:00\nb1\n@d 5/12/2020\nb2\n";

#[derive(Default)]
struct RecordingNotifier {
    delivered: Mutex<Vec<(u64, String, String)>>,
    errors: Mutex<Vec<String>>,
    fail_on: Option<String>,
}

impl RecordingNotifier {
    fn failing_on(link: &str) -> Self {
        Self {
            fail_on: Some(link.to_string()),
            ..Default::default()
        }
    }

    fn links(&self) -> Vec<String> {
        self.delivered
            .lock()
            .unwrap()
            .iter()
            .map(|(_, _, link)| link.clone())
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify_entry(&self, n: &EntryNotification<'_>) -> Result<()> {
        if self.fail_on.as_deref() == Some(n.entry.link.as_str()) {
            bail!("notification service unavailable");
        }
        self.delivered.lock().unwrap().push((
            n.id,
            n.calendar_title.to_string(),
            n.entry.link.clone(),
        ));
        Ok(())
    }

    fn notify_error(&self, title: &str, _message: &str) -> Result<()> {
        self.errors.lock().unwrap().push(title.to_string());
        Ok(())
    }
}

fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2020, 12, day)
        .unwrap()
        .and_hms_opt(h, m, 0)
        .unwrap()
}

fn subscribe(ctx: &TestContext, name: &str, text: &str) -> u32 {
    let file = ctx.get_data_dir().unwrap().join(name);
    fs::write(&file, text).unwrap();
    CalendarConfigStore::modify(ctx, |s| {
        s.add(CalendarConfig::new(0, file.to_string_lossy(), name, None))
    })
    .unwrap()
}

fn stored(ctx: &TestContext, id: u32) -> CalendarConfig {
    CalendarConfigStore::load(ctx)
        .unwrap()
        .get(id)
        .cloned()
        .unwrap()
}

#[test]
fn test_cycle_delivers_and_persists_cursor() {
    let ctx = TestContext::new();
    let advent = subscribe(&ctx, "advent.txt", ADVENT);
    let evenings = subscribe(&ctx, "evenings.txt", EVENINGS);
    let mut cache = CalendarCache::new();
    let notifier = RecordingNotifier::default();

    let report = run_cycle(&ctx, &mut cache, &notifier, at(2, 9, 0)).unwrap();
    assert_eq!(report.delivered, 3);
    assert!(report.disabled.is_empty());
    assert_eq!(report.next_wake, Some(at(3, 8, 0)));

    let delivered = notifier.delivered.lock().unwrap().clone();
    assert_eq!(
        delivered,
        [
            (0, "advent.txt".to_string(), "a1".to_string()),
            (1, "advent.txt".to_string(), "a2".to_string()),
            (1 << 32, "evenings.txt".to_string(), "b1".to_string()),
        ]
    );
    assert_eq!(stored(&ctx, advent).pos, 2);
    assert_eq!(stored(&ctx, evenings).pos, 1);

    // Rerunning at the same instant delivers nothing new.
    let report = run_cycle(&ctx, &mut cache, &notifier, at(2, 9, 0)).unwrap();
    assert_eq!(report.delivered, 0);
    assert_eq!(notifier.links().len(), 3);
}

#[test]
fn test_failed_dispatch_does_not_advance_cursor() {
    let ctx = TestContext::new();
    let advent = subscribe(&ctx, "advent.txt", ADVENT);
    subscribe(&ctx, "evenings.txt", EVENINGS);
    let mut cache = CalendarCache::new();

    let flaky = RecordingNotifier::failing_on("a2");
    let now = at(2, 9, 0);
    let report = run_cycle(&ctx, &mut cache, &flaky, now).unwrap();
    assert_eq!(flaky.links(), ["a1", "b1"]);
    assert_eq!(report.delivered, 2);
    assert_eq!(stored(&ctx, advent).pos, 1);
    // The failed entry is retried soon, ahead of everything else.
    assert_eq!(report.next_wake, Some(now + TimeDelta::minutes(1)));

    let healthy = RecordingNotifier::default();
    run_cycle(&ctx, &mut cache, &healthy, now).unwrap();
    assert_eq!(healthy.links(), ["a2"]);
    assert_eq!(stored(&ctx, advent).pos, 2);
}

#[test]
fn test_unloadable_calendar_is_disabled() {
    let ctx = TestContext::new();
    let broken = subscribe(&ctx, "broken.txt", "@title Broken\n@begin\n");
    subscribe(&ctx, "evenings.txt", EVENINGS);
    let missing = subscribe(&ctx, "gone.txt", ADVENT);
    fs::remove_file(ctx.get_data_dir().unwrap().join("gone.txt")).unwrap();

    let mut cache = CalendarCache::new();
    let notifier = RecordingNotifier::default();
    let report = run_cycle(&ctx, &mut cache, &notifier, at(2, 9, 0)).unwrap();

    assert_eq!(report.disabled, [broken, missing]);
    assert_eq!(notifier.errors.lock().unwrap().len(), 2);
    assert_eq!(notifier.links(), ["b1"]);
    assert!(!stored(&ctx, broken).notifications_enabled);
    assert!(!stored(&ctx, missing).notifications_enabled);

    // Disabled calendars are skipped from now on.
    let report = run_cycle(&ctx, &mut cache, &notifier, at(2, 9, 0)).unwrap();
    assert!(report.disabled.is_empty());
    assert_eq!(notifier.errors.lock().unwrap().len(), 2);
}

#[test]
fn test_next_wake_ignores_disabled_calendars() {
    let ctx = TestContext::new();
    let advent = subscribe(&ctx, "advent.txt", ADVENT);
    subscribe(&ctx, "evenings.txt", EVENINGS);
    CalendarConfigStore::modify(&ctx, |s| {
        if let Some(c) = s.get_mut(advent) {
            c.notifications_enabled = false;
        }
        Ok(())
    })
    .unwrap();

    let mut cache = CalendarCache::new();
    let notifier = RecordingNotifier::default();
    let report = run_cycle(&ctx, &mut cache, &notifier, at(1, 0, 30)).unwrap();
    assert_eq!(report.delivered, 0);
    assert_eq!(report.next_wake, Some(at(1, 18, 0)));

    let report = run_cycle(&ctx, &mut cache, &notifier, at(31, 0, 0)).unwrap();
    assert_eq!(notifier.links(), ["b1", "b2"]);
    assert_eq!(report.next_wake, None);
    assert_eq!(stored(&ctx, advent).pos, 0);
}

#[test]
fn test_removed_calendar_leaves_cache() {
    let ctx = TestContext::new();
    let advent = subscribe(&ctx, "advent.txt", ADVENT);
    let mut cache = CalendarCache::new();
    let notifier = RecordingNotifier::default();

    run_cycle(&ctx, &mut cache, &notifier, at(1, 0, 0)).unwrap();
    assert!(cache.contains(advent));

    CalendarConfigStore::modify(&ctx, |s| Ok(s.remove(advent))).unwrap();
    run_cycle(&ctx, &mut cache, &notifier, at(1, 0, 0)).unwrap();
    assert!(cache.is_empty());
}

async fn wait_for_links(recorder: &RecordingNotifier, count: usize) {
    let mut waited = Duration::ZERO;
    while recorder.links().len() < count && waited < Duration::from_secs(10) {
        tokio::time::sleep(Duration::from_millis(20)).await;
        waited += Duration::from_millis(20);
    }
}

#[tokio::test]
async fn test_driver_runs_until_senders_drop() {
    let test_ctx = TestContext::new();
    subscribe(&test_ctx, "advent.txt", ADVENT);
    let ctx: SharedContext = Arc::new(test_ctx);

    let recorder = Arc::new(RecordingNotifier::default());
    let notifier: Arc<dyn Notifier> = recorder.clone();
    let (tx, handle) = spawn_driver(ctx, notifier, Duration::from_secs(60));

    // All entries lie in the past, so the first cycle delivers them.
    wait_for_links(&recorder, 3).await;
    assert_eq!(recorder.links(), ["a1", "a2", "a3"]);

    drop(tx);
    tokio::time::timeout(Duration::from_secs(10), handle)
        .await
        .expect("driver should stop once the sender is dropped")
        .unwrap();
    assert_eq!(recorder.links().len(), 3);
}

#[tokio::test]
async fn test_rescan_picks_up_new_subscription() {
    let test_ctx = Arc::new(TestContext::new());
    let ctx: SharedContext = test_ctx.clone();

    let recorder = Arc::new(RecordingNotifier::default());
    let notifier: Arc<dyn Notifier> = recorder.clone();
    // Nothing is subscribed, so without a rescan the driver sleeps for an hour.
    let (tx, handle) = spawn_driver(ctx, notifier, Duration::from_secs(3600));
    tokio::time::sleep(Duration::from_millis(100)).await;

    subscribe(&test_ctx, "evenings.txt", EVENINGS);
    tx.send(DriverMessage::Rescan).await.unwrap();
    wait_for_links(&recorder, 2).await;
    assert_eq!(recorder.links(), ["b1", "b2"]);

    drop(tx);
    tokio::time::timeout(Duration::from_secs(10), handle)
        .await
        .expect("driver should stop once the sender is dropped")
        .unwrap();
}

#[tokio::test]
async fn test_store_watcher_triggers_rescan() {
    let test_ctx = Arc::new(TestContext::new());
    let ctx: SharedContext = test_ctx.clone();

    let recorder = Arc::new(RecordingNotifier::default());
    let notifier: Arc<dyn Notifier> = recorder.clone();
    let (tx, driver) = spawn_driver(Arc::clone(&ctx), notifier, Duration::from_secs(3600));
    let watcher = spawn_store_watcher(ctx, tx.downgrade(), Duration::from_millis(50));
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Another process subscribing is noticed without any message.
    subscribe(&test_ctx, "advent.txt", ADVENT);
    wait_for_links(&recorder, 3).await;
    assert_eq!(recorder.links(), ["a1", "a2", "a3"]);

    // The watcher does not keep the driver alive.
    drop(tx);
    tokio::time::timeout(Duration::from_secs(10), driver)
        .await
        .expect("driver should stop once the sender is dropped")
        .unwrap();
    tokio::time::timeout(Duration::from_secs(10), watcher)
        .await
        .expect("watcher should stop with the driver")
        .unwrap();
}
