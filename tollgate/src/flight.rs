//! A lazily initialized value whose initialization runs once at a time

use std::{fmt, future::Future};

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::{Mutex, OnceCell};

type Flight<T, E> = Shared<BoxFuture<'static, Result<T, E>>>;

/// A value initialized on first use by a fallible, asynchronous function
///
/// Callers that arrive while an initialization is running wait for it and
/// share its outcome, success or failure. A failure is not remembered: the
/// next caller to arrive after it starts a fresh attempt. A success is kept
/// for the lifetime of the cell.
pub struct SingleFlight<T, E> {
    value: OnceCell<T>,
    in_flight: Mutex<Option<Flight<T, E>>>,
}

impl<T, E> Default for SingleFlight<T, E> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> fmt::Debug for SingleFlight<T, E>
where
    T: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("SingleFlight")
            .field("value", &self.value.get())
            .finish_non_exhaustive()
    }
}

impl<T, E> SingleFlight<T, E> {
    /// An uninitialized cell
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::new_with(None)
    }

    /// A cell that is already initialized if `value` is `Some`
    #[inline]
    #[must_use]
    pub fn new_with(value: Option<T>) -> Self {
        Self {
            value: OnceCell::new_with(value),
            in_flight: Mutex::new(None),
        }
    }

    /// The value, if initialization has succeeded
    #[inline]
    pub fn get(&self) -> Option<&T> {
        self.value.get()
    }
}

impl<T, E> SingleFlight<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Returns the value, initializing it with `init` if needed
    ///
    /// `init` is only called when no initialization is already running.
    ///
    /// # Errors
    ///
    /// Returns the error of the initialization this caller waited on.
    pub async fn get_or_try_init<F, Fut>(&self, init: F) -> Result<&T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        if let Some(value) = self.value.get() {
            return Ok(value);
        }

        let flight = {
            let mut slot = self.in_flight.lock().await;
            if let Some(value) = self.value.get() {
                return Ok(value);
            }

            slot.get_or_insert_with(|| init().boxed().shared()).clone()
        };

        let outcome = match flight.clone().await {
            Ok(value) => Ok(self.value.get_or_init(|| async move { value }).await),
            Err(err) => Err(err),
        };

        // The value is stored before the slot is cleared, so no later caller
        // starts another attempt after a success
        let mut slot = self.in_flight.lock().await;
        if slot.as_ref().is_some_and(|current| current.ptr_eq(&flight)) {
            *slot = None;
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        time::Duration,
    };

    use super::*;

    async fn attempt(
        calls: Arc<AtomicUsize>,
        outcome: Result<u32, &'static str>,
    ) -> Result<u32, &'static str> {
        calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        outcome
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_failure() {
        let cell = SingleFlight::<u32, &'static str>::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let init = || attempt(calls.clone(), Err("down"));
        let (a, b, c) = tokio::join!(
            cell.get_or_try_init(init),
            cell.get_or_try_init(init),
            cell.get_or_try_init(init),
        );

        assert_eq!((a, b, c), (Err("down"), Err("down"), Err("down")));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cell.get(), None);
    }

    #[tokio::test]
    async fn caller_after_a_failure_tries_again() {
        let cell = SingleFlight::<u32, &'static str>::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let first = cell.get_or_try_init(|| attempt(calls.clone(), Err("down"))).await;
        let second = cell.get_or_try_init(|| attempt(calls.clone(), Ok(7))).await;

        assert_eq!(first, Err("down"));
        assert_eq!(second, Ok(&7));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn success_is_kept() {
        let cell = SingleFlight::<u32, &'static str>::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let init = || attempt(calls.clone(), Ok(7));
        let (a, b) = tokio::join!(cell.get_or_try_init(init), cell.get_or_try_init(init));
        let c = cell.get_or_try_init(init).await;

        assert_eq!((a, b, c), (Ok(&7), Ok(&7), Ok(&7)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn preset_value_never_initializes() {
        let cell = SingleFlight::<u32, &'static str>::new_with(Some(3));
        let calls = Arc::new(AtomicUsize::new(0));

        let value = cell.get_or_try_init(|| attempt(calls.clone(), Ok(9))).await;

        assert_eq!(value, Ok(&3));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
