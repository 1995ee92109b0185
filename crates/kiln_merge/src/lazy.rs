//! Computed-once holders for values that are expensive to produce.

use std::sync::Arc;

use parking_lot::Mutex;

/// A value computed on first successful access and shared afterwards.
///
/// The lock is held while the value is being computed, so concurrent callers
/// wait for the first computation instead of repeating it. A failed
/// computation stores nothing; the next call tries again.
#[derive(Debug)]
pub struct Memo<T> {
    slot: Mutex<Option<Arc<T>>>,
}

impl<T> Memo<T> {
    /// Creates an empty holder.
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    /// Returns the stored value, computing it with `init` if absent.
    pub fn get_or_try_init<E>(
        &self,
        init: impl FnOnce() -> Result<Arc<T>, E>,
    ) -> Result<Arc<T>, E> {
        let mut slot = self.slot.lock();
        if let Some(value) = slot.as_ref() {
            return Ok(Arc::clone(value));
        }
        let value = init()?;
        *slot = Some(Arc::clone(&value));
        Ok(value)
    }

    /// Returns `true` once a value has been stored.
    pub fn is_initialized(&self) -> bool {
        self.slot.lock().is_some()
    }
}

impl<T> Default for Memo<T> {
    fn default() -> Self {
        Self::new()
    }
}
