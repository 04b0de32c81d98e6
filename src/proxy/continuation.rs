//! Single-assignment completion handle.
//!
//! A [`Continuation`] is the producer side of one outcome and a
//! [`Resolution`] the consumer side. `resolve` takes the continuation by
//! value, so resolving twice does not compile. A continuation dropped without
//! being resolved delivers its fallback instead, and the waiter always gets
//! exactly one value.

use tokio::sync::oneshot;

pub struct Continuation<T: Send + 'static> {
    tx: Option<oneshot::Sender<T>>,
    fallback: Option<T>,
}

pub struct Resolution<T> {
    rx: oneshot::Receiver<T>,
}

impl<T: Send + 'static> Continuation<T> {
    /// Create a linked pair. `fallback` is delivered if the continuation is
    /// dropped unresolved.
    pub fn new(fallback: T) -> (Self, Resolution<T>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                tx: Some(tx),
                fallback: Some(fallback),
            },
            Resolution { rx },
        )
    }

    /// Deliver the outcome. Returns false if the waiter has gone away.
    pub fn resolve(mut self, value: T) -> bool {
        self.fallback = None;
        match self.tx.take() {
            Some(tx) => tx.send(value).is_ok(),
            None => false,
        }
    }
}

impl<T: Send + 'static> Drop for Continuation<T> {
    fn drop(&mut self) {
        if let (Some(tx), Some(fallback)) = (self.tx.take(), self.fallback.take()) {
            let _ = tx.send(fallback);
        }
    }
}

impl<T> Resolution<T> {
    /// Wait for the outcome. `None` only if the continuation vanished
    /// without running its destructor (e.g. leaked).
    pub async fn wait(self) -> Option<T> {
        self.rx.await.ok()
    }
}
