//! Single-assignment futures that do not depend on an async runtime.
//!
//! A [`Promise`] is the resolving side; [`Promise::handle`] hands out any
//! number of [`AsyncFuture`] observers. An observer can be polled
//! (`is_done`/`result`/`error`), subscribed to with callbacks, or awaited,
//! since it implements [`std::future::Future`].
//!
//! Resolution is one-way and exactly-once. A second `complete` or `cancel`
//! returns [`SheetError::AlreadyResolved`] and leaves the first outcome in
//! place. Subscribing to a future that is already terminal runs the callback
//! immediately with the stored outcome.

use std::{
    fmt,
    future::Future,
    pin::Pin,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    task::{Context, Poll, Waker},
};

use crate::error::{SheetError, SheetResult};

type CompleteCallback<T> = Box<dyn FnOnce(T) + Send>;
type CancelCallback = Box<dyn FnOnce(SheetError) + Send>;

enum State<T> {
    Pending,
    Completed(T),
    Canceled(SheetError),
}

struct Shared<T> {
    state: State<T>,
    on_complete: Vec<CompleteCallback<T>>,
    on_cancel: Vec<CancelCallback>,
    wakers: Vec<Waker>,
}

impl<T> Shared<T> {
    fn new() -> Self {
        Self {
            state: State::Pending,
            on_complete: Vec::new(),
            on_cancel: Vec::new(),
            wakers: Vec::new(),
        }
    }
}

fn lock<T>(shared: &Mutex<Shared<T>>) -> MutexGuard<'_, Shared<T>> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Resolving side of an [`AsyncFuture`].
///
/// Dropping a promise that was never resolved cancels its future.
pub struct Promise<T: Clone + Send + 'static> {
    shared: Arc<Mutex<Shared<T>>>,
}

impl<T: Clone + Send + 'static> Default for Promise<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + 'static> Promise<T> {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared::new())),
        }
    }

    /// Observer handle for this promise.
    pub fn handle(&self) -> AsyncFuture<T> {
        AsyncFuture {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn is_done(&self) -> bool {
        !matches!(lock(&self.shared).state, State::Pending)
    }

    pub fn complete(&self, value: T) -> SheetResult<()> {
        let (callbacks, wakers) = {
            let mut shared = lock(&self.shared);
            if !matches!(shared.state, State::Pending) {
                return Err(SheetError::AlreadyResolved("complete"));
            }
            shared.state = State::Completed(value.clone());
            shared.on_cancel.clear();
            (
                std::mem::take(&mut shared.on_complete),
                std::mem::take(&mut shared.wakers),
            )
        };
        for callback in callbacks {
            callback(value.clone());
        }
        wakers.into_iter().for_each(Waker::wake);
        Ok(())
    }

    pub fn cancel(&self, error: SheetError) -> SheetResult<()> {
        let (callbacks, wakers) = {
            let mut shared = lock(&self.shared);
            if !matches!(shared.state, State::Pending) {
                return Err(SheetError::AlreadyResolved("cancel"));
            }
            shared.state = State::Canceled(error.clone());
            shared.on_complete.clear();
            (
                std::mem::take(&mut shared.on_cancel),
                std::mem::take(&mut shared.wakers),
            )
        };
        for callback in callbacks {
            callback(error.clone());
        }
        wakers.into_iter().for_each(Waker::wake);
        Ok(())
    }
}

impl<T: Clone + Send + 'static> Drop for Promise<T> {
    fn drop(&mut self) {
        if !self.is_done() {
            let _ = self.cancel(SheetError::Canceled);
        }
    }
}

impl<T: Clone + Send + 'static> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("done", &self.is_done())
            .finish()
    }
}

/// Observer side of a single-assignment result.
pub struct AsyncFuture<T: Clone + Send + 'static> {
    shared: Arc<Mutex<Shared<T>>>,
}

impl<T: Clone + Send + 'static> Clone for AsyncFuture<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Clone + Send + 'static> fmt::Debug for AsyncFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match lock(&self.shared).state {
            State::Pending => "pending",
            State::Completed(_) => "completed",
            State::Canceled(_) => "canceled",
        };
        f.debug_struct("AsyncFuture").field("state", &state).finish()
    }
}

impl<T: Clone + Send + 'static> AsyncFuture<T> {
    /// Future that is already completed.
    pub fn ready(value: T) -> Self {
        let promise = Promise::new();
        let handle = promise.handle();
        let _ = promise.complete(value);
        handle
    }

    /// Future that is already canceled.
    pub fn canceled(error: SheetError) -> Self {
        let promise = Promise::new();
        let handle = promise.handle();
        let _ = promise.cancel(error);
        handle
    }

    pub fn is_done(&self) -> bool {
        !matches!(lock(&self.shared).state, State::Pending)
    }

    pub fn is_completed(&self) -> bool {
        matches!(lock(&self.shared).state, State::Completed(_))
    }

    pub fn is_canceled(&self) -> bool {
        matches!(lock(&self.shared).state, State::Canceled(_))
    }

    /// Completed value, `None` while pending or after cancellation.
    pub fn result(&self) -> Option<T> {
        match &lock(&self.shared).state {
            State::Completed(value) => Some(value.clone()),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<SheetError> {
        match &lock(&self.shared).state {
            State::Canceled(error) => Some(error.clone()),
            _ => None,
        }
    }

    pub fn on_complete<F>(&self, callback: F)
    where
        F: FnOnce(T) + Send + 'static,
    {
        let value = {
            let mut shared = lock(&self.shared);
            if matches!(shared.state, State::Pending) {
                shared.on_complete.push(Box::new(callback));
                return;
            }
            match &shared.state {
                State::Completed(value) => value.clone(),
                _ => return,
            }
        };
        callback(value);
    }

    pub fn on_cancel<F>(&self, callback: F)
    where
        F: FnOnce(SheetError) + Send + 'static,
    {
        let error = {
            let mut shared = lock(&self.shared);
            if matches!(shared.state, State::Pending) {
                shared.on_cancel.push(Box::new(callback));
                return;
            }
            match &shared.state {
                State::Canceled(error) => error.clone(),
                _ => return,
            }
        };
        callback(error);
    }

    /// Resolves once every input is done, with each outcome in input order.
    /// The joined future completes even when some inputs were canceled.
    pub fn join_all(futures: Vec<AsyncFuture<T>>) -> AsyncFuture<Vec<SheetResult<T>>> {
        let promise = Arc::new(Promise::new());
        let handle = promise.handle();
        if futures.is_empty() {
            let _ = promise.complete(Vec::new());
            return handle;
        }
        let remaining = Arc::new(AtomicUsize::new(futures.len()));
        let inputs = Arc::new(futures.clone());
        for future in futures {
            let promise = Arc::clone(&promise);
            let remaining = Arc::clone(&remaining);
            let inputs = Arc::clone(&inputs);
            let finish = move || {
                if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                    let outcomes = inputs.iter().map(AsyncFuture::outcome).collect();
                    let _ = promise.complete(outcomes);
                }
            };
            let on_cancel = finish.clone();
            future.on_complete(move |_| finish());
            future.on_cancel(move |_| on_cancel());
        }
        handle
    }

    fn outcome(&self) -> SheetResult<T> {
        match &lock(&self.shared).state {
            State::Completed(value) => Ok(value.clone()),
            State::Canceled(error) => Err(error.clone()),
            State::Pending => Err(SheetError::Canceled),
        }
    }
}

impl<T: Clone + Send + 'static> Future for AsyncFuture<T> {
    type Output = SheetResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut shared = lock(&self.shared);
        if matches!(shared.state, State::Pending) {
            if !shared.wakers.iter().any(|w| w.will_wake(cx.waker())) {
                shared.wakers.push(cx.waker().clone());
            }
            return Poll::Pending;
        }
        match &shared.state {
            State::Completed(value) => Poll::Ready(Ok(value.clone())),
            State::Canceled(error) => Poll::Ready(Err(error.clone())),
            State::Pending => Poll::Pending,
        }
    }
}

#[derive(Default)]
struct CancelInner {
    cancelled: AtomicBool,
    wakers: Mutex<Vec<Waker>>,
}

/// Cooperative cancellation signal shared by the fetcher and the pipeline.
///
/// Clones share state.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        let wakers = std::mem::take(
            &mut *self
                .inner
                .wakers
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        wakers.into_iter().for_each(Waker::wake);
    }

    fn register(&self, waker: &Waker) {
        let mut wakers = self
            .inner
            .wakers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !wakers.iter().any(|w| w.will_wake(waker)) {
            wakers.push(waker.clone());
        }
    }

    /// Wraps `future` so every poll first checks this token.
    pub fn guard<F>(&self, future: F) -> Cancellable<F>
    where
        F: Future + Unpin,
    {
        Cancellable {
            inner: future,
            token: self.clone(),
        }
    }
}

/// Future that yields `Err(SheetError::Canceled)` once its token fires.
#[derive(Debug)]
pub struct Cancellable<F> {
    inner: F,
    token: CancelToken,
}

impl<F, T> Future for Cancellable<F>
where
    F: Future<Output = SheetResult<T>> + Unpin,
{
    type Output = SheetResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.token.is_cancelled() {
            return Poll::Ready(Err(SheetError::Canceled));
        }
        self.token.register(cx.waker());
        // Re-check after registering so a cancel racing the registration is seen.
        if self.token.is_cancelled() {
            return Poll::Ready(Err(SheetError::Canceled));
        }
        Pin::new(&mut self.inner).poll(cx)
    }
}
