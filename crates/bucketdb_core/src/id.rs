//! Entity id generation.
//!
//! Ids become key segments, so every generator produces `/`-free strings.
//! Entities that are range-queried by id need ids that sort in creation
//! order; all generators here do.

use crate::error::{CoreError, CoreResult};
use crate::settings::Settings;
use async_trait::async_trait;
use futures::lock::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Produces unique entity ids.
#[async_trait]
pub trait IdGenerator: Send + Sync {
    /// Returns a fresh id.
    async fn next_id(&self) -> CoreResult<String>;
}

/// Returns the current time in milliseconds since the epoch.
pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Ids of the form `<millis>-<counter>`, e.g. `1700000000000-00042`.
///
/// The five-digit counter wraps after 99999, so ids stay unique as long as
/// fewer than that many are generated within one millisecond.
#[derive(Debug, Default)]
pub struct DateIdGenerator {
    counter: AtomicU32,
}

impl DateIdGenerator {
    const WRAP: u32 = 99_999;

    /// Creates a new generator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn next_counter(&self) -> u32 {
        let previous = self
            .counter
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |i| {
                Some((i + 1) % Self::WRAP)
            })
            .unwrap_or_default();
        (previous + 1) % Self::WRAP
    }
}

#[async_trait]
impl IdGenerator for DateIdGenerator {
    async fn next_id(&self) -> CoreResult<String> {
        Ok(format!("{}-{:05}", now_millis(), self.next_counter()))
    }
}

/// Time-ordered UUID v7 ids in simple (hyphen-free) form.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidIdGenerator;

#[async_trait]
impl IdGenerator for UuidIdGenerator {
    async fn next_id(&self) -> CoreResult<String> {
        Ok(uuid::Uuid::now_v7().simple().to_string())
    }
}

/// Sequential ids backed by a durable counter in [`Settings`].
///
/// The counter for collection `name` lives under `auto-increment/<name>` and
/// starts at 1000. Ids are zero-padded so they sort numerically.
pub struct AutoIncrementGenerator {
    settings: Settings,
    counter: String,
    width: usize,
    lock: Mutex<()>,
}

impl AutoIncrementGenerator {
    /// First value handed out for a new counter.
    pub const START: u64 = 1000;

    /// Default number of digits in an id.
    pub const DEFAULT_WIDTH: usize = 12;

    /// Creates a generator for the counter `name`.
    pub fn new(name: &str, settings: Settings) -> Self {
        Self {
            settings,
            counter: format!("auto-increment/{name}"),
            width: Self::DEFAULT_WIDTH,
            lock: Mutex::new(()),
        }
    }

    /// Sets the number of digits ids are padded to.
    #[must_use]
    pub fn with_width(mut self, width: usize) -> Self {
        self.width = width;
        self
    }

    /// Advances the counter and returns its new value.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if another process advanced the counter concurrently.
    pub async fn next_value(&self) -> CoreResult<u64> {
        let _guard = self.lock.lock().await;
        let next = match self.settings.get(&self.counter).await {
            Ok(current) => current.as_u64().map(|n| n + 1).ok_or_else(|| {
                CoreError::malformed(&self.counter, "counter is not a number")
            })?,
            Err(CoreError::NotFound { .. }) => Self::START,
            Err(err) => return Err(err),
        };
        self.settings.set(&self.counter, Value::from(next)).await?;
        Ok(next)
    }
}

#[async_trait]
impl IdGenerator for AutoIncrementGenerator {
    async fn next_id(&self) -> CoreResult<String> {
        let value = self.next_value().await?;
        Ok(format!("{value:0width$}", width = self.width))
    }
}

impl std::fmt::Debug for AutoIncrementGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutoIncrementGenerator")
            .field("counter", &self.counter)
            .field("width", &self.width)
            .finish_non_exhaustive()
    }
}
