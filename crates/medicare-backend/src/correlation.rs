use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use hashbrown::HashMap;

use medicare::command::Command;

use tokio::task::JoinHandle;
use tokio::time::Instant;

use tokio_util::sync::CancellationToken;

use tracing::{debug, info};

use crate::error::{Error, Result};

/// Default time a command waits for its result before being evicted.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// A command awaiting its result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCommand {
    /// Command name.
    pub command: String,
    /// Serial number of the device the command has been published to.
    pub serie_number: String,
    /// When the command has been registered.
    pub issued_at: Instant,
}

/// An in-memory table mapping correlation tokens to pending commands.
///
/// The table is shared by the dispatch path, which registers commands, and
/// by the broker path, which consumes them when their results arrive.
/// Every operation runs under one lock, so a token is consumed exactly once.
///
/// Entries are evicted once their time-to-live elapses, either by an
/// explicit [`CorrelationTable::sweep_expired`] call or by the task started
/// with [`CorrelationTable::run_sweeper`]. A process restart loses every
/// pending entry.
#[derive(Debug)]
pub struct CorrelationTable {
    entries: Mutex<HashMap<String, PendingCommand>>,
    ttl: Duration,
}

impl Default for CorrelationTable {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl CorrelationTable {
    /// Creates a [`CorrelationTable`] evicting entries older than `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    // The map stays consistent even if a holder panicked, since every
    // critical section is a single map operation.
    fn entries(&self) -> MutexGuard<'_, HashMap<String, PendingCommand>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a [`Command`] sent to the device `serie_number` under its
    /// correlation token.
    ///
    /// # Errors
    ///
    /// An error is returned if the token is already pending.
    pub fn register(&self, command: &Command, serie_number: impl Into<String>) -> Result<()> {
        let mut entries = self.entries();
        if entries.contains_key(&command.hash) {
            return Err(Error::internal(
                "The correlation token is already pending.",
            ));
        }

        let _ = entries.insert(
            command.hash.clone(),
            PendingCommand {
                command: command.command.clone(),
                serie_number: serie_number.into(),
                issued_at: Instant::now(),
            },
        );
        debug!("Registered correlation token {}", command.hash);
        Ok(())
    }

    /// Resolves and removes a pending command in a single step.
    ///
    /// Returns [`None`] for unknown, expired, or already consumed tokens.
    #[must_use]
    pub fn take(&self, token: &str) -> Option<PendingCommand> {
        self.entries().remove(token)
    }

    /// Resolves and removes the pending command a device answered to.
    ///
    /// A token registered for another device is left pending and [`None`]
    /// is returned, as for unknown, expired, or already consumed tokens.
    #[must_use]
    pub fn resolve(&self, token: &str, serie_number: &str) -> Option<PendingCommand> {
        let mut entries = self.entries();
        match entries.get(token) {
            Some(pending) if pending.serie_number == serie_number => entries.remove(token),
            Some(pending) => {
                debug!(
                    "Token {token} belongs to `{}`, not to `{serie_number}`",
                    pending.serie_number
                );
                None
            }
            None => None,
        }
    }

    /// Removes a pending command, returning whether it was present.
    pub fn remove(&self, token: &str) -> bool {
        self.entries().remove(token).is_some()
    }

    /// Whether a token is pending.
    #[must_use]
    pub fn contains(&self, token: &str) -> bool {
        self.entries().contains_key(token)
    }

    /// Returns the number of pending commands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    /// Whether there are no pending commands.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Evicts the commands whose time-to-live has elapsed, returning how
    /// many have been evicted.
    pub fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(Instant::now())
    }

    fn sweep_expired_at(&self, now: Instant) -> usize {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, pending| now.saturating_duration_since(pending.issued_at) < self.ttl);
        before - entries.len()
    }

    /// Starts a task evicting expired commands every `interval`.
    ///
    /// The task stops when the cancellation token is cancelled.
    ///
    /// # Panics
    ///
    /// Panics if `interval` is zero.
    pub fn run_sweeper(
        self: Arc<Self>,
        interval: Duration,
        cancellation_token: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    // Use the cancellation token to stop the loop
                    () = cancellation_token.cancelled() => { break; }
                    _ = ticker.tick() => {
                        let evicted = self.sweep_expired();
                        if evicted > 0 {
                            info!("Evicted {evicted} commands without result");
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use medicare::command::Command;

    use tokio::time::Instant;

    use tokio_util::sync::CancellationToken;

    use super::CorrelationTable;

    #[test]
    fn consumed_exactly_once() {
        let table = CorrelationTable::default();
        let command = Command::new("42", "read");

        table.register(&command, "TH-001").unwrap();
        assert!(table.contains("42"));

        let pending = table.take("42").unwrap();
        assert_eq!(pending.command, "read");
        assert_eq!(pending.serie_number, "TH-001");

        // A duplicated result is dropped.
        assert_eq!(table.take("42"), None);
        assert!(table.is_empty());
    }

    #[test]
    fn duplicated_token() {
        let table = CorrelationTable::default();

        table.register(&Command::new("42", "read"), "TH-001").unwrap();
        assert!(table.register(&Command::new("42", "calibrate"), "TH-001").is_err());

        // The first registration is kept.
        assert_eq!(table.take("42").unwrap().command, "read");
    }

    #[test]
    fn resolve_for_target_device() {
        let table = CorrelationTable::default();
        table.register(&Command::new("42", "read"), "TH-001").unwrap();

        // Another device cannot consume the token.
        assert_eq!(table.resolve("42", "OX-001"), None);
        assert!(table.contains("42"));

        let pending = table.resolve("42", "TH-001").unwrap();
        assert_eq!(pending.command, "read");
        assert_eq!(pending.serie_number, "TH-001");

        assert_eq!(table.resolve("42", "TH-001"), None);
        assert_eq!(table.resolve("unknown", "TH-001"), None);
    }

    #[test]
    fn remove_tokens() {
        let table = CorrelationTable::default();

        table.register(&Command::new("1", "read"), "TH-001").unwrap();
        table.register(&Command::new("2", "read"), "TH-001").unwrap();

        assert!(table.remove("1"));
        assert!(!table.remove("1"));
        assert!(!table.remove("unknown"));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn sweep_expired_entries() {
        let ttl = Duration::from_secs(60);
        let table = CorrelationTable::new(ttl);

        table.register(&Command::new("1", "read"), "TH-001").unwrap();
        table.register(&Command::new("2", "read"), "TH-001").unwrap();

        assert_eq!(table.sweep_expired_at(Instant::now()), 0);
        assert_eq!(table.len(), 2);

        let later = Instant::now() + ttl + Duration::from_millis(1);
        assert_eq!(table.sweep_expired_at(later), 2);
        assert_eq!(table.take("1"), None);
    }

    #[test]
    fn concurrent_consumers() {
        let table = Arc::new(CorrelationTable::default());
        table.register(&Command::new("7", "read"), "TH-001").unwrap();

        let handles = (0..8)
            .map(|_| {
                let table = Arc::clone(&table);
                std::thread::spawn(move || table.take("7").is_some())
            })
            .collect::<Vec<_>>();

        let consumed = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(|consumed| *consumed)
            .count();
        assert_eq!(consumed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_task() {
        let table = Arc::new(CorrelationTable::new(Duration::from_secs(1)));
        table.register(&Command::new("1", "read"), "TH-001").unwrap();

        let token = CancellationToken::new();
        let handle = Arc::clone(&table).run_sweeper(Duration::from_millis(500), token.clone());

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(table.is_empty());

        token.cancel();
        handle.await.unwrap();
    }
}
