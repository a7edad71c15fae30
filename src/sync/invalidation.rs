//! Invalidation signals for cached views.
//!
//! Anything rendering from the cache subscribes here and re-reads when
//! told. Signals are fire-and-forget: a lagging or absent subscriber
//! never blocks the sender.

use tokio::sync::broadcast;
use tracing::trace;

use crate::event::Category;

const CHANNEL_CAPACITY: usize = 64;

/// What a subscriber should re-read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Invalidation {
    /// Every cached query.
    All,
    /// Queries over one category.
    Category(Category),
}

impl Invalidation {
    /// Returns true if a view over `category` must refresh.
    #[must_use]
    pub fn affects(self, category: Category) -> bool {
        match self {
            Self::All => true,
            Self::Category(c) => c == category,
        }
    }
}

/// Broadcast channel for [`Invalidation`] signals.
#[derive(Debug, Clone)]
pub struct InvalidationBus {
    tx: broadcast::Sender<Invalidation>,
}

impl Default for InvalidationBus {
    fn default() -> Self {
        Self::new()
    }
}

impl InvalidationBus {
    /// Creates a bus with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Subscribes to future signals.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Invalidation> {
        self.tx.subscribe()
    }

    /// Invalidates every cached query.
    pub fn invalidate_all(&self) {
        self.emit(Invalidation::All);
    }

    /// Invalidates queries over `category`.
    pub fn invalidate(&self, category: Category) {
        self.emit(Invalidation::Category(category));
    }

    fn emit(&self, signal: Invalidation) {
        // No receivers is fine
        let receivers = self.tx.send(signal).unwrap_or(0);
        trace!(?signal, receivers, "invalidation emitted");
    }
}
