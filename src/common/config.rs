use std::time::Duration;

/// Default size of a page in bytes (4 KB)
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Default number of pages the buffer pool may hold
pub const DEFAULT_POOL_PAGES: usize = 50;

/// Lower bound of the randomized lock wait
pub const DEFAULT_LOCK_WAIT_MIN: Duration = Duration::from_millis(1000);

/// Upper bound of the randomized lock wait
pub const DEFAULT_LOCK_WAIT_MAX: Duration = Duration::from_millis(3000);

/// Bounds of the interval a lock request may wait before its transaction is aborted.
///
/// Each request draws its own wait uniformly from `[min, max]`, so two transactions
/// blocked on each other time out at different moments instead of in lockstep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockWait {
    pub min: Duration,
    pub max: Duration,
}

impl LockWait {
    /// A wait bound drawn from `[min, max]`. The bounds are swapped if given reversed.
    pub fn between(min: Duration, max: Duration) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    /// A deterministic wait bound.
    pub fn fixed(wait: Duration) -> Self {
        Self {
            min: wait,
            max: wait,
        }
    }
}

impl Default for LockWait {
    fn default() -> Self {
        Self::between(DEFAULT_LOCK_WAIT_MIN, DEFAULT_LOCK_WAIT_MAX)
    }
}

/// Construction parameters of a [`BufferPool`](crate::buffer::BufferPool).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferPoolConfig {
    /// Maximum number of resident pages
    pub max_pages: usize,
    /// Wait bound applied to every lock request
    pub lock_wait: LockWait,
}

impl BufferPoolConfig {
    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    pub fn with_lock_wait(mut self, lock_wait: LockWait) -> Self {
        self.lock_wait = lock_wait;
        self
    }
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self {
            max_pages: DEFAULT_POOL_PAGES,
            lock_wait: LockWait::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_wait_between_orders_bounds() {
        let wait = LockWait::between(Duration::from_millis(50), Duration::from_millis(10));
        assert_eq!(wait.min, Duration::from_millis(10));
        assert_eq!(wait.max, Duration::from_millis(50));
    }

    #[test]
    fn test_buffer_pool_config_builders() {
        let config = BufferPoolConfig::default()
            .with_max_pages(2)
            .with_lock_wait(LockWait::fixed(Duration::from_millis(20)));

        assert_eq!(config.max_pages, 2);
        assert_eq!(config.lock_wait.min, config.lock_wait.max);
        assert_eq!(BufferPoolConfig::default().max_pages, DEFAULT_POOL_PAGES);
    }
}
