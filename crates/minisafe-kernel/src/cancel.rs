//! [`CancelFlag`] – one-way emergency-stop latch.
//!
//! The flag is set from outside the control loop (console listener, Ctrl-C
//! handler thread) and observed inside it.  Synchronous callers poll
//! [`CancelFlag::is_set`]; async callers race [`CancelFlag::cancelled`] against
//! whatever they are waiting on.
//!
//! Once set the flag never clears.
//!
//! # Example
//!
//! ```
//! use minisafe_kernel::CancelFlag;
//!
//! let flag = CancelFlag::new();
//! let handle = flag.clone();
//! assert!(!flag.is_set());
//! handle.trigger();
//! assert!(flag.is_set());
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

#[derive(Default)]
struct Inner {
    set: AtomicBool,
    notify: Notify,
}

/// Cloneable cancellation flag shared by every task in a session.
#[derive(Clone, Default)]
pub struct CancelFlag {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for CancelFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelFlag")
            .field("set", &self.is_set())
            .finish()
    }
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag and wake every task waiting in [`cancelled`][Self::cancelled].
    ///
    /// Safe to call from any thread, including non-async signal handlers.
    pub fn trigger(&self) {
        if !self.inner.set.swap(true, Ordering::SeqCst) {
            self.inner.notify.notify_waiters();
        }
    }

    pub fn is_set(&self) -> bool {
        self.inner.set.load(Ordering::SeqCst)
    }

    /// Resolve once the flag is set.  Returns immediately if it already is.
    pub async fn cancelled(&self) {
        let notified = self.inner.notify.notified();
        tokio::pin!(notified);
        loop {
            // Register interest before checking, so a trigger between the
            // check and the await is not lost.
            notified.as_mut().enable();
            if self.is_set() {
                return;
            }
            notified.as_mut().await;
            if self.is_set() {
                return;
            }
            notified.set(self.inner.notify.notified());
        }
    }
}
