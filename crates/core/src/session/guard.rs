use std::ops::Deref;

use crate::media::{Pipeline, TransportSink};

/// Something with an idempotent `close()`.
pub trait Closeable {
    fn close_now(&self);
}

impl Closeable for Box<dyn Pipeline> {
    fn close_now(&self) {
        self.close();
    }
}

impl Closeable for Box<dyn TransportSink> {
    fn close_now(&self) {
        self.close();
    }
}

/// Owns a pipeline or sink and closes it exactly once: either through
/// [`close`](Self::close) or when dropped on an error path.
pub struct CloseOnDrop<T: Closeable> {
    inner: T,
    closed: bool,
}

impl<T: Closeable> CloseOnDrop<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            closed: false,
        }
    }

    pub fn close(mut self) {
        self.closed = true;
        self.inner.close_now();
    }
}

impl<T: Closeable> Deref for CloseOnDrop<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T: Closeable> Drop for CloseOnDrop<T> {
    fn drop(&mut self) {
        if !self.closed {
            self.closed = true;
            self.inner.close_now();
        }
    }
}
