// File: ./src/store.rs
// File-backed store of all calendar subscriptions.
//
// The store is one text file: a header line with the format version and the
// next free id, followed by one record per subscribed calendar. Every access
// happens under the store lock; `modify` keeps the lock across
// load -> mutate -> save so concurrent processes never lose each other's updates.
use crate::calendar_config::{CalendarConfig, FORMAT_VERSION, SettingsUpdate, check_field};
use crate::model::Calendar;
use crate::context::AppContext;
use crate::storage::LocalStorage;
use anyhow::{Context, Result, bail};
use std::path::Path;

const HEADER_TAG: &str = "lincal-config";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CalendarConfigStore {
    next_id: u32,
    entries: Vec<CalendarConfig>,
}

impl CalendarConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the store, upgrading an older file format in place.
    pub fn load(ctx: &dyn AppContext) -> Result<Self> {
        let path = ctx.get_calendar_store_path()?;
        LocalStorage::with_lock(&path, || Self::load_unlocked(&path))
    }

    pub fn load_all(ctx: &dyn AppContext) -> Result<Vec<CalendarConfig>> {
        Ok(Self::load(ctx)?.entries)
    }

    pub fn save(&self, ctx: &dyn AppContext) -> Result<()> {
        let path = ctx.get_calendar_store_path()?;
        LocalStorage::with_lock(&path, || self.save_unlocked(&path))
    }

    /// Load, apply `f`, and save, all while holding the store lock.
    /// Nothing is written when `f` fails or leaves the store unchanged.
    pub fn modify<F, T>(ctx: &dyn AppContext, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        let path = ctx.get_calendar_store_path()?;
        LocalStorage::with_lock(&path, || {
            let mut store = Self::load_unlocked(&path)?;
            let before = store.clone();
            let out = f(&mut store)?;
            if store != before {
                store.save_unlocked(&path)?;
            }
            Ok(out)
        })
    }

    /// Applies `update` to the subscription `id` and returns the stored result.
    pub fn update_settings(
        ctx: &dyn AppContext,
        id: u32,
        update: &SettingsUpdate,
        calendar: Option<&Calendar>,
    ) -> Result<CalendarConfig> {
        Self::modify(ctx, |store| {
            let Some(config) = store.get_mut(id) else {
                bail!("No calendar with id {}", id);
            };
            config.apply_update(update, calendar)?;
            Ok(config.clone())
        })
    }

    /// Replaces the stored record that has the same id as `config`.
    pub fn persist(ctx: &dyn AppContext, config: &CalendarConfig) -> Result<()> {
        Self::modify(ctx, |store| {
            let Some(slot) = store.get_mut(config.id) else {
                bail!("No calendar with id {} in the store", config.id);
            };
            *slot = config.clone();
            Ok(())
        })
    }

    /// Adds a subscription, assigning it a fresh id (the id in `config` is ignored).
    pub fn add(&mut self, mut config: CalendarConfig) -> Result<u32> {
        check_field("calendar title", &config.calendar_title)?;
        check_field("calendar file", &config.calendar_file)?;
        let id = self.next_id;
        self.next_id += 1;
        config.id = id;
        self.entries.push(config);
        Ok(id)
    }

    pub fn remove(&mut self, id: u32) -> Option<CalendarConfig> {
        let idx = self.entries.iter().position(|c| c.id == id)?;
        Some(self.entries.remove(idx))
    }

    pub fn get(&self, id: u32) -> Option<&CalendarConfig> {
        self.entries.iter().find(|c| c.id == id)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut CalendarConfig> {
        self.entries.iter_mut().find(|c| c.id == id)
    }

    /// Subscriptions in the order they were added.
    pub fn entries(&self) -> &[CalendarConfig] {
        &self.entries
    }

    pub fn entries_mut(&mut self) -> &mut [CalendarConfig] {
        &mut self.entries
    }

    pub fn contains_calendar_file(&self, file: &str) -> bool {
        self.entries.iter().any(|c| c.calendar_file == file)
    }

    pub fn next_id(&self) -> u32 {
        self.next_id
    }

    fn load_unlocked(path: &Path) -> Result<Self> {
        let Some(text) = LocalStorage::read_optional(path)? else {
            return Ok(Self::default());
        };
        let (store, version) = Self::parse(&text)
            .with_context(|| format!("Failed to load calendar store {:?}", path))?;
        if version < FORMAT_VERSION {
            log::info!(
                "Migrating calendar store {:?} from v{} to v{}",
                path,
                version,
                FORMAT_VERSION
            );
            store.save_unlocked(path)?;
        }
        Ok(store)
    }

    fn save_unlocked(&self, path: &Path) -> Result<()> {
        LocalStorage::atomic_write(path, self.serialize())
    }

    /// Returns the store and the format version the text was written in.
    pub fn parse(text: &str) -> Result<(Self, u32)> {
        let mut lines = text.lines().filter(|l| !l.trim().is_empty());
        let Some(header) = lines.next() else {
            return Ok((Self::default(), FORMAT_VERSION));
        };

        // v0 files start with a bare next-id counter.
        if let Ok(next_id) = header.trim().parse::<u32>() {
            let mut store = Self::default();
            for (i, line) in lines.enumerate() {
                let id = u32::try_from(i).context("Too many calendars")?;
                store.entries.push(CalendarConfig::from_v0_record(line, id)?);
            }
            let used = u32::try_from(store.entries.len()).context("Too many calendars")?;
            store.next_id = next_id.max(used);
            return Ok((store, 0));
        }

        let parts: Vec<&str> = header.trim().split(';').collect();
        let [tag, version, next_id] = parts.as_slice() else {
            bail!("Malformed store header '{}'", header);
        };
        if *tag != HEADER_TAG {
            bail!("Malformed store header '{}'", header);
        }
        let version: u32 = version
            .parse()
            .with_context(|| format!("Invalid format version '{}'", version))?;
        if version > FORMAT_VERSION {
            bail!(
                "Calendar store was written by a newer version (format v{}, supported up to v{})",
                version,
                FORMAT_VERSION
            );
        }
        let next_id: u32 = next_id
            .parse()
            .with_context(|| format!("Invalid next id '{}'", next_id))?;

        let entries = lines
            .map(CalendarConfig::from_record)
            .collect::<Result<Vec<_>>>()?;
        if let Some(max) = entries.iter().map(|c| c.id).max()
            && max >= next_id
        {
            bail!("Store header next id {} is not above id {}", next_id, max);
        }
        Ok((Self { next_id, entries }, version))
    }

    pub fn serialize(&self) -> String {
        let mut out = format!("{};{};{}\n", HEADER_TAG, FORMAT_VERSION, self.next_id);
        for entry in &self.entries {
            out.push_str(&entry.to_record());
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TestContext;
    use chrono::NaiveTime;

    fn config(file: &str, title: &str) -> CalendarConfig {
        CalendarConfig::new(0, file, title, NaiveTime::from_hms_opt(12, 0, 0))
    }

    #[test]
    fn test_add_assigns_increasing_ids() {
        let mut store = CalendarConfigStore::new();
        assert_eq!(store.add(config("/a.txt", "A")).unwrap(), 0);
        assert_eq!(store.add(config("/b.txt", "B")).unwrap(), 1);
        store.remove(0);
        // ids are never reused
        assert_eq!(store.add(config("/c.txt", "C")).unwrap(), 2);
        assert!(store.contains_calendar_file("/b.txt"));
        assert!(!store.contains_calendar_file("/a.txt"));
    }

    #[test]
    fn test_add_rejects_separator() {
        let mut store = CalendarConfigStore::new();
        assert!(store.add(config("/a.txt", "A;B")).is_err());
        assert_eq!(store.next_id(), 0);
    }

    #[test]
    fn test_serialize_parse() {
        let mut store = CalendarConfigStore::new();
        store.add(config("/a.txt", "A")).unwrap();
        store.add(config("/b.txt", "B")).unwrap();
        let text = store.serialize();
        assert!(text.starts_with("lincal-config;1;2\n"));
        let (parsed, version) = CalendarConfigStore::parse(&text).unwrap();
        assert_eq!(version, FORMAT_VERSION);
        assert_eq!(parsed, store);
    }

    #[test]
    fn test_parse_rejects_newer_format() {
        let err = CalendarConfigStore::parse("lincal-config;99;0\n").unwrap_err();
        assert!(err.to_string().contains("newer version"));
    }

    #[test]
    fn test_missing_file_is_empty_store() {
        let ctx = TestContext::new();
        let store = CalendarConfigStore::load(&ctx).unwrap();
        assert!(store.entries().is_empty());
    }

    #[test]
    fn test_failed_modify_writes_nothing() {
        let ctx = TestContext::new();
        CalendarConfigStore::modify(&ctx, |s| s.add(config("/a.txt", "A"))).unwrap();
        let res: Result<()> = CalendarConfigStore::modify(&ctx, |s| {
            s.add(config("/b.txt", "B"))?;
            bail!("abort")
        });
        assert!(res.is_err());
        assert_eq!(CalendarConfigStore::load_all(&ctx).unwrap().len(), 1);
    }

    #[test]
    fn test_unchanged_modify_writes_nothing() {
        let ctx = TestContext::new();
        let path = ctx.get_calendar_store_path().unwrap();
        let count = CalendarConfigStore::modify(&ctx, |s| Ok(s.entries().len())).unwrap();
        assert_eq!(count, 0);
        assert!(!path.exists());
    }
}
