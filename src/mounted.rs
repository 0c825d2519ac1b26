use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Liveness of the context that started an operation. Once unmounted,
/// in-flight work may finish but must not report back.
#[derive(Clone, Debug)]
pub struct Mounted(Arc<AtomicBool>);

impl Mounted {
    /// A mounted context.
    pub fn new() -> Self {
        Mounted(Arc::new(AtomicBool::new(true)))
    }

    /// Whether the context is still mounted.
    pub fn is_mounted(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Tears the context down.
    pub fn unmount(&self) {
        self.0.store(false, Ordering::Release)
    }
}

impl Default for Mounted {
    fn default() -> Self {
        Self::new()
    }
}
