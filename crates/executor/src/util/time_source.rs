use std::time::Instant;

/// Trait for getting current time
pub trait TimeSource: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually advanced clock for tests.
#[cfg(test)]
pub struct ManualTimeSource {
    base: Instant,
    offset: std::sync::Mutex<std::time::Duration>,
}

#[cfg(test)]
impl ManualTimeSource {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Default::default(),
        }
    }

    pub fn advance(&self, by: std::time::Duration) {
        *self.offset.lock().unwrap() += by;
    }
}

#[cfg(test)]
impl TimeSource for ManualTimeSource {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock().unwrap()
    }
}
