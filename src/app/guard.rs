use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Admits one download session at a time.
#[derive(Debug, Clone, Default)]
pub struct DownloadGate {
    in_flight: Arc<AtomicBool>,
}

impl DownloadGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self) -> Option<DownloadPermit> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| DownloadPermit {
                in_flight: Arc::clone(&self.in_flight),
            })
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }
}

/// Released on drop, including early returns and panics.
#[derive(Debug)]
pub struct DownloadPermit {
    in_flight: Arc<AtomicBool>,
}

impl Drop for DownloadPermit {
    fn drop(&mut self) {
        self.in_flight.store(false, Ordering::Release);
    }
}

/// Lets exactly one caller through, once.
#[derive(Debug, Clone, Default)]
pub struct OnceFlag {
    fired: Arc<AtomicBool>,
}

impl OnceFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// True for the first caller only.
    pub fn fire(&self) -> bool {
        !self.fired.swap(true, Ordering::AcqRel)
    }

    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }
}
