use crate::record::Record;
use crate::schema::ModelId;
use crate::store::RecordStore;
use crate::sync::SyncOutcome;
use crate::AppError;
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    BeforeCreate,
    BeforeUpdate,
    BeforeDestroy,
}

pub type Handler = Box<dyn Fn(&mut dyn RecordStore, &mut Record) -> Result<SyncOutcome, AppError> + Send + Sync>;

/// Explicit per-model subscriptions, handlers run in subscription order.
#[derive(Default)]
pub struct Hooks {
    handlers: HashMap<(ModelId, LifecycleEvent), Vec<Handler>>,
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks").field("subscriptions", &self.handler_count()).finish()
    }
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&mut self, model: ModelId, event: LifecycleEvent, handler: F)
    where
        F: Fn(&mut dyn RecordStore, &mut Record) -> Result<SyncOutcome, AppError> + Send + Sync + 'static,
    {
        self.handlers.entry((model, event)).or_default().push(Box::new(handler));
    }

    pub fn on_before_create<F>(&mut self, model: ModelId, handler: F)
    where
        F: Fn(&mut dyn RecordStore, &mut Record) -> Result<SyncOutcome, AppError> + Send + Sync + 'static,
    {
        self.subscribe(model, LifecycleEvent::BeforeCreate, handler)
    }

    pub fn on_before_update<F>(&mut self, model: ModelId, handler: F)
    where
        F: Fn(&mut dyn RecordStore, &mut Record) -> Result<SyncOutcome, AppError> + Send + Sync + 'static,
    {
        self.subscribe(model, LifecycleEvent::BeforeUpdate, handler)
    }

    pub fn on_before_destroy<F>(&mut self, model: ModelId, handler: F)
    where
        F: Fn(&mut dyn RecordStore, &mut Record) -> Result<SyncOutcome, AppError> + Send + Sync + 'static,
    {
        self.subscribe(model, LifecycleEvent::BeforeDestroy, handler)
    }

    pub fn is_subscribed(&self, model: ModelId, event: LifecycleEvent) -> bool {
        self.handlers.get(&(model, event)).is_some_and(|h| !h.is_empty())
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.values().map(Vec::len).sum()
    }

    /// Stops at the first failing handler, its error is the caller's cue to abort.
    pub fn dispatch(&self, event: LifecycleEvent, store: &mut dyn RecordStore, record: &mut Record) -> Result<SyncOutcome, AppError> {
        let mut outcome = SyncOutcome::default();
        if let Some(handlers) = self.handlers.get(&(record.model(), event)) {
            for handler in handlers {
                outcome.merge(handler(&mut *store, &mut *record)?);
            }
        }
        Ok(outcome)
    }
}
