//! Session agenda: the reservation dictionary, its persisted store and
//! the background scheduling loop.

use super::reservation::SessionReservation;
use crate::config::AgendaConfig;
use crate::error::{TychoError, TychoResult};
use crate::time::TimeInterval;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Version tag written as the first record of the reservation store
const STORE_VERSION: &str = "1.0";

#[derive(Debug, Serialize, Deserialize)]
struct StoreHeader {
    version: String,
}

struct AgendaInner {
    config: AgendaConfig,
    reservations: Mutex<BTreeMap<i32, SessionReservation>>,
    last_reservation_id: AtomicI32,
    dirty: AtomicBool,
    running: AtomicBool,
    stop_requested: AtomicBool,
}

/// The session agenda service.
///
/// Reservation mutations and queries run in the caller's context; a
/// dedicated background thread periodically persists the dictionary and
/// watches the stop conditions. Cancellation is cooperative with a
/// latency bounded by the configured tick.
pub struct Agenda {
    inner: Arc<AgendaInner>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Agenda {
    pub fn new(config: AgendaConfig) -> TychoResult<Self> {
        config.validate()?;
        Ok(Agenda {
            inner: Arc::new(AgendaInner {
                config,
                reservations: Mutex::new(BTreeMap::new()),
                last_reservation_id: AtomicI32::new(0),
                dirty: AtomicBool::new(false),
                running: AtomicBool::new(false),
                stop_requested: AtomicBool::new(false),
            }),
            handle: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &AgendaConfig {
        &self.inner.config
    }

    /// Identifier the next reservation should use.
    pub fn next_reservation_id(&self) -> i32 {
        self.inner.last_reservation_id.load(Ordering::SeqCst) + 1
    }

    /// Last identifier seen, either assigned or read from the store.
    pub fn last_reservation_id(&self) -> i32 {
        self.inner.last_reservation_id.load(Ordering::SeqCst)
    }

    /// Insert a reservation. Duplicate identifiers fail and leave the
    /// dictionary unchanged.
    pub fn add_reservation(&self, reservation: SessionReservation) -> TychoResult<()> {
        if !reservation.is_valid() {
            return Err(TychoError::invalid_input(format!(
                "Invalid session reservation [{}]",
                reservation.id
            )));
        }
        let mut dict = self.inner.reservations.lock();
        if dict.contains_key(&reservation.id) {
            return Err(TychoError::invalid_input(format!(
                "Session reservation with ID [{}] already exists",
                reservation.id
            )));
        }
        log::debug!(
            "Agenda: adding reservation [{}] '{}' at {}",
            reservation.id,
            reservation.key,
            reservation.when
        );
        self.inner
            .last_reservation_id
            .store(reservation.id, Ordering::SeqCst);
        dict.insert(reservation.id, reservation);
        self.inner.dirty.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Remove a reservation; an absent identifier fails.
    pub fn remove_reservation(&self, id: i32) -> TychoResult<()> {
        let mut dict = self.inner.reservations.lock();
        if dict.remove(&id).is_none() {
            return Err(TychoError::invalid_input(format!(
                "No session reservation with ID [{}]",
                id
            )));
        }
        log::debug!("Agenda: removed reservation [{}]", id);
        self.inner.dirty.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub fn has_reservation(&self, id: i32) -> bool {
        self.inner.reservations.lock().contains_key(&id)
    }

    pub fn reservation(&self, id: i32) -> Option<SessionReservation> {
        self.inner.reservations.lock().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.reservations.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.reservations.lock().is_empty()
    }

    /// All reservations, in identifier order.
    pub fn all_sessions(&self) -> Vec<SessionReservation> {
        self.inner.reservations.lock().values().cloned().collect()
    }

    /// Reservations whose interval contains `t`.
    pub fn simultaneous_sessions(&self, t: DateTime<Utc>) -> Vec<SessionReservation> {
        self.collect(|r| r.when.contains(t))
    }

    /// Reservations active right now.
    pub fn current_sessions(&self) -> Vec<SessionReservation> {
        self.simultaneous_sessions(Utc::now())
    }

    /// Reservations beginning strictly after now.
    pub fn future_sessions(&self) -> Vec<SessionReservation> {
        let now = Utc::now();
        self.collect(|r| r.when.begin() > now)
    }

    /// Reservations beginning strictly before now. A session still
    /// running is reported here as well; begin, not end, decides.
    pub fn past_sessions(&self) -> Vec<SessionReservation> {
        let now = Utc::now();
        self.collect(|r| r.when.begin() < now)
    }

    /// Reservations overlapping the given interval.
    pub fn intersection_sessions(&self, interval: &TimeInterval) -> Vec<SessionReservation> {
        self.collect(|r| r.when.intersects(interval))
    }

    /// First future reservation in identifier order.
    pub fn next_session(&self) -> Option<SessionReservation> {
        let now = Utc::now();
        self.inner
            .reservations
            .lock()
            .values()
            .find(|r| r.when.begin() > now)
            .cloned()
    }

    fn collect<F>(&self, mut keep: F) -> Vec<SessionReservation>
    where
        F: FnMut(&SessionReservation) -> bool,
    {
        self.inner
            .reservations
            .lock()
            .values()
            .filter(|r| keep(r))
            .cloned()
            .collect()
    }

    /// Load the reservation dictionary from the configured store. A
    /// missing store yields an empty dictionary.
    pub fn load(&self) -> TychoResult<()> {
        let mut dict = self.inner.reservations.lock();
        self.inner.last_reservation_id.store(0, Ordering::SeqCst);
        dict.clear();
        let path = &self.inner.config.reservations_store;
        if !path.exists() {
            log::debug!("Agenda: no reservation store at '{}'", path.display());
            self.inner.dirty.store(false, Ordering::SeqCst);
            return Ok(());
        }
        let reader = BufReader::new(std::fs::File::open(path)?);
        let mut lines = reader.lines();
        let header_line = next_record(&mut lines, path, "version header")?;
        let header: StoreHeader = serde_json::from_str(&header_line).map_err(|e| {
            TychoError::serialization(format!(
                "Invalid reservation store header in '{}': {}",
                path.display(),
                e
            ))
        })?;
        if header.version != STORE_VERSION {
            return Err(TychoError::serialization(format!(
                "Unsupported reservation store version '{}' in '{}'",
                header.version,
                path.display()
            )));
        }
        let count_line = next_record(&mut lines, path, "record count")?;
        let count: usize = count_line.trim().parse().map_err(|_| {
            TychoError::serialization(format!(
                "Invalid reservation record count '{}' in '{}'",
                count_line,
                path.display()
            ))
        })?;
        for _ in 0..count {
            let line = next_record(&mut lines, path, "reservation record")?;
            let reservation: SessionReservation = serde_json::from_str(&line).map_err(|e| {
                TychoError::serialization(format!(
                    "Invalid reservation record in '{}': {}",
                    path.display(),
                    e
                ))
            })?;
            self.inner
                .last_reservation_id
                .store(reservation.id, Ordering::SeqCst);
            dict.insert(reservation.id, reservation);
        }
        log::info!(
            "Agenda: loaded {} reservation(s) from '{}'",
            dict.len(),
            path.display()
        );
        self.inner.dirty.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Persist the reservation dictionary, rotating any prior store into
    /// a numbered backup first.
    pub fn store(&self) -> TychoResult<()> {
        let dict = self.inner.reservations.lock();
        let path = &self.inner.config.reservations_store;
        if path.exists() {
            if self.inner.config.purge_store == 0 {
                std::fs::remove_file(path)?;
            } else {
                rotate_backups(path, self.inner.config.purge_store)?;
            }
        }
        let mut file = std::fs::File::create(path)?;
        let header = StoreHeader {
            version: STORE_VERSION.to_string(),
        };
        writeln!(file, "{}", serde_json::to_string(&header).map_err(to_ser_error)?)?;
        writeln!(file, "{}", dict.len())?;
        for reservation in dict.values() {
            writeln!(
                file,
                "{}",
                serde_json::to_string(reservation).map_err(to_ser_error)?
            )?;
        }
        log::debug!(
            "Agenda: stored {} reservation(s) to '{}'",
            dict.len(),
            path.display()
        );
        self.inner.dirty.store(false, Ordering::SeqCst);
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Start the scheduling loop in a background thread; fails if the
    /// loop is already running.
    pub fn start(&self) -> TychoResult<()> {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return Err(TychoError::precondition(
                "Agenda scheduling loop is already running",
            ));
        }
        self.inner.stop_requested.store(false, Ordering::SeqCst);
        let inner = Arc::clone(&self.inner);
        let handle = std::thread::Builder::new()
            .name("tycho-agenda".to_string())
            .spawn(move || scheduling_loop(inner))
            .map_err(|e| {
                self.inner.running.store(false, Ordering::SeqCst);
                TychoError::Io(e)
            })?;
        *self.handle.lock() = Some(handle);
        log::info!("Agenda: scheduling loop started");
        Ok(())
    }

    /// Request a cooperative stop; only valid while the loop runs.
    pub fn stop(&self) -> TychoResult<()> {
        if !self.is_running() {
            return Err(TychoError::precondition(
                "Agenda scheduling loop is not running",
            ));
        }
        self.inner.stop_requested.store(true, Ordering::SeqCst);
        log::info!("Agenda: stop requested");
        Ok(())
    }

    /// Wait for the scheduling loop thread to finish.
    pub fn join(&self) -> TychoResult<()> {
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            handle
                .join()
                .map_err(|_| TychoError::precondition("Agenda scheduling loop panicked"))?;
        }
        Ok(())
    }
}

impl Drop for Agenda {
    fn drop(&mut self) {
        if self.is_running() {
            self.inner.stop_requested.store(true, Ordering::SeqCst);
        }
        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.join();
        }
    }
}

fn scheduling_loop(inner: Arc<AgendaInner>) {
    let agenda = Agenda {
        inner: Arc::clone(&inner),
        handle: Mutex::new(None),
    };
    if let Err(e) = agenda.load() {
        log::warn!("Agenda: cannot load reservation store: {}", e);
    }
    let tick = Duration::from_millis(inner.config.tick_ms);
    loop {
        std::thread::sleep(tick);
        if inner.dirty.load(Ordering::SeqCst) {
            if let Err(e) = agenda.store() {
                log::warn!("Agenda: cannot persist reservation store: {}", e);
            }
        }
        let stop_file = inner.config.stop_file.exists();
        if stop_file || inner.stop_requested.load(Ordering::SeqCst) {
            if stop_file {
                log::info!(
                    "Agenda: stop file '{}' detected",
                    inner.config.stop_file.display()
                );
            }
            break;
        }
    }
    if inner.dirty.load(Ordering::SeqCst) {
        if let Err(e) = agenda.store() {
            log::warn!("Agenda: cannot persist reservation store: {}", e);
        }
    }
    inner.running.store(false, Ordering::SeqCst);
    log::info!("Agenda: scheduling loop stopped");
}

fn to_ser_error(e: serde_json::Error) -> TychoError {
    TychoError::serialization(e.to_string())
}

fn next_record(
    lines: &mut std::io::Lines<BufReader<std::fs::File>>,
    path: &Path,
    what: &str,
) -> TychoResult<String> {
    match lines.next() {
        Some(line) => Ok(line?),
        None => Err(TychoError::serialization(format!(
            "Truncated reservation store '{}': missing {}",
            path.display(),
            what
        ))),
    }
}

/// Rename the current store to the next numbered backup, then drop the
/// oldest backups beyond the retention depth.
fn rotate_backups(store: &Path, depth: usize) -> TychoResult<()> {
    let mut indices = backup_indices(store)?;
    let next = indices.last().map(|n| n + 1).unwrap_or(1);
    std::fs::rename(store, backup_path(store, next))?;
    indices.push(next);
    while indices.len() > depth {
        let oldest = indices.remove(0);
        std::fs::remove_file(backup_path(store, oldest))?;
    }
    Ok(())
}

fn backup_path(store: &Path, index: u64) -> PathBuf {
    let mut name = store.as_os_str().to_os_string();
    name.push(format!(".bak.{}", index));
    PathBuf::from(name)
}

fn backup_indices(store: &Path) -> TychoResult<Vec<u64>> {
    let parent = store.parent().unwrap_or_else(|| Path::new("."));
    let file_name = match store.file_name() {
        Some(name) => name.to_string_lossy().into_owned(),
        None => return Err(TychoError::config("Invalid reservation store path")),
    };
    let prefix = format!("{}.bak.", file_name);
    let mut indices = Vec::new();
    for entry in std::fs::read_dir(parent)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if let Some(suffix) = name.strip_prefix(&prefix) {
            if let Ok(index) = suffix.parse::<u64>() {
                indices.push(index);
            }
        }
    }
    indices.sort_unstable();
    Ok(indices)
}
