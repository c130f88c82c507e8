use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::error::FieldError;
use crate::json_ext::Value;

type LoadResult = Result<Value, FieldError>;

enum Slot {
    Ready(LoadResult),
    Pending(broadcast::Sender<LoadResult>),
}

/// A per-request cache coalescing loads of the same key.
///
/// The first caller for a key runs its loader; concurrent callers for that
/// key wait for its result, later callers get the memoized result.
#[derive(Clone, Default)]
pub struct LoaderCache {
    slots: Arc<Mutex<HashMap<String, Slot>>>,
}

impl LoaderCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn load<F, Fut>(&self, key: impl Into<String>, loader: F) -> Result<Value, FieldError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, FieldError>>,
    {
        let key = key.into();
        let receiver = {
            let mut slots = self.slots.lock();
            match slots.get(&key) {
                Some(Slot::Ready(result)) => return result.clone(),
                Some(Slot::Pending(sender)) => Some(sender.subscribe()),
                None => {
                    let (sender, _receiver) = broadcast::channel(1);
                    slots.insert(key.clone(), Slot::Pending(sender));
                    None
                }
            }
        };

        if let Some(mut receiver) = receiver {
            tracing::trace!(%key, "waiting for in-flight load");
            return receiver.recv().await.unwrap_or_else(|_| {
                Err(FieldError::fault(format!(
                    "load of '{key}' was abandoned before completing"
                )))
            });
        }

        // dropping the guard before completion releases the key for a new attempt
        let guard = PendingGuard {
            key,
            slots: self.slots.clone(),
            done: false,
        };
        let result = loader().await;
        guard.complete(result.clone());
        result
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }
}

struct PendingGuard {
    key: String,
    slots: Arc<Mutex<HashMap<String, Slot>>>,
    done: bool,
}

impl PendingGuard {
    fn complete(mut self, result: LoadResult) {
        let previous = self
            .slots
            .lock()
            .insert(self.key.clone(), Slot::Ready(result.clone()));
        if let Some(Slot::Pending(sender)) = previous {
            let _ = sender.send(result);
        }
        self.done = true;
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if !self.done {
            self.slots.lock().remove(&self.key);
        }
    }
}
