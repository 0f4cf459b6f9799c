//! Blocking and deferred pixel readback.
//!
//! A deferred readback is a future that resolves once the backend signals the
//! copy is complete. Backends that need to be driven (a wgpu device has to be
//! polled for `map_async` callbacks to run) install a pump that is called on
//! every poll of the future.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::channel::oneshot;

use crate::error::{RenderError, RenderResult};

pub use cadpick_core::ReadbackMode;

type Pump = Box<dyn FnMut() + Send>;
type Finish = Box<dyn FnOnce() -> RenderResult<Vec<u8>> + Send>;
type Cancel = Box<dyn FnOnce() + Send>;

/// Sender half handed to a backend's completion callback.
pub type ReadbackSignal = oneshot::Sender<RenderResult<()>>;

/// A pixel readback that has been issued but not yet completed.
#[must_use = "a pending readback does nothing unless awaited"]
pub struct PendingReadback {
    signal: Option<oneshot::Receiver<RenderResult<()>>>,
    pump: Option<Pump>,
    finish: Option<Finish>,
    /// Runs when the readback is dropped before it resolved.
    cancel: Option<Cancel>,
}

impl PendingReadback {
    /// Creates a readback and the signal that completes it.
    ///
    /// `finish` runs once after the signal fired with `Ok` and returns the
    /// tightly packed RGBA bytes.
    pub fn new<F>(finish: F) -> (Self, ReadbackSignal)
    where
        F: FnOnce() -> RenderResult<Vec<u8>> + Send + 'static,
    {
        let (sender, receiver) = oneshot::channel();
        let pending = Self {
            signal: Some(receiver),
            pump: None,
            finish: Some(Box::new(finish)),
            cancel: None,
        };
        (pending, sender)
    }

    /// A readback whose bytes are already available.
    pub fn ready(bytes: Vec<u8>) -> Self {
        let (pending, signal) = Self::new(move || Ok(bytes));
        // The receiver is alive in `pending`, so this cannot fail.
        let _ = signal.send(Ok(()));
        pending
    }

    /// Installs a function called on every poll to drive the backend.
    pub fn with_pump<P>(mut self, pump: P) -> Self
    where
        P: FnMut() + Send + 'static,
    {
        self.pump = Some(Box::new(pump));
        self
    }

    /// Installs a function run if the readback is dropped unresolved, e.g. to
    /// release a staging buffer whose mapping is still pending.
    pub fn with_cancel<C>(mut self, cancel: C) -> Self
    where
        C: FnOnce() + Send + 'static,
    {
        self.cancel = Some(Box::new(cancel));
        self
    }

    /// Blocks the current thread until the bytes are available.
    pub fn wait(self) -> RenderResult<Vec<u8>> {
        pollster::block_on(self)
    }
}

impl Future for PendingReadback {
    type Output = RenderResult<Vec<u8>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        if let Some(pump) = this.pump.as_mut() {
            pump();
        }

        let Some(signal) = this.signal.as_mut() else {
            return Poll::Ready(Err(RenderError::ReadbackCancelled));
        };

        match Pin::new(signal).poll(cx) {
            Poll::Pending => {
                // Nothing else will wake us while the backend needs pumping.
                if this.pump.is_some() {
                    cx.waker().wake_by_ref();
                }
                Poll::Pending
            }
            Poll::Ready(Err(oneshot::Canceled)) => {
                this.signal = None;
                this.cancel = None;
                Poll::Ready(Err(RenderError::ReadbackCancelled))
            }
            Poll::Ready(Ok(status)) => {
                this.signal = None;
                this.cancel = None;
                let result = status.and_then(|()| match this.finish.take() {
                    Some(finish) => finish(),
                    None => Err(RenderError::ReadbackCancelled),
                });
                Poll::Ready(result)
            }
        }
    }
}

impl Drop for PendingReadback {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            log::debug!("pending readback dropped before completion");
            cancel();
        }
    }
}

impl fmt::Debug for PendingReadback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingReadback")
            .field("completed", &self.signal.is_none())
            .field("pumped", &self.pump.is_some())
            .finish_non_exhaustive()
    }
}
