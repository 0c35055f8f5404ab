use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use futures::channel::oneshot;
use futures::future::{FutureExt, Shared};

/// Liveness guard shared by a form and every async operation it starts.
///
/// Once ended, pending work must not write state back. Requests holding the
/// token resolve as aborted.
#[derive(Clone, Default)]
pub struct ScopeToken {
    inner: Arc<ScopeInner>,
}

struct ScopeInner {
    ended: AtomicBool,
    // Dropping the sender completes every clone of `signal`.
    sender: Mutex<Option<oneshot::Sender<()>>>,
    signal: Shared<oneshot::Receiver<()>>,
}

impl Default for ScopeInner {
    fn default() -> Self {
        let (sender, receiver) = oneshot::channel();
        Self {
            ended: AtomicBool::new(false),
            sender: Mutex::new(Some(sender)),
            signal: receiver.shared(),
        }
    }
}

impl ScopeToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        !self.inner.ended.load(Ordering::SeqCst)
    }

    pub fn end(&self) {
        if self.inner.ended.swap(true, Ordering::SeqCst) {
            return;
        }
        let sender = match self.inner.sender.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        drop(sender);
    }

    /// Resolves once [`ScopeToken::end`] has been called.
    pub fn ended(&self) -> ScopeEnded {
        ScopeEnded {
            signal: self.inner.signal.clone(),
        }
    }
}

impl std::fmt::Debug for ScopeToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeToken")
            .field("active", &self.is_active())
            .finish()
    }
}

/// Waker registration is released when this future is dropped.
pub struct ScopeEnded {
    signal: Shared<oneshot::Receiver<()>>,
}

impl Future for ScopeEnded {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // The sender is only ever dropped, so the receiver settles as `Canceled`.
        self.signal.poll_unpin(cx).map(|_| ())
    }
}
