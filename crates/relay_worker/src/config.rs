use std::time::Duration;

/// Tunables for one relay worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    /// How long an enqueue waits before draining, so bursts land in one batch
    pub drain_debounce: Duration,
    /// Upper bound on identifiers pulled into one subscription
    pub max_batch_size: usize,
    /// Batched categories time out after `batch len * secs_per_identifier`
    pub secs_per_identifier: u64,
    /// Contacts lookups run one at a time and wait this long for an answer
    pub contacts_timeout: Duration,
    /// How long a published event may wait for the relay's `OK`
    pub publish_timeout: Duration,
    /// Used by downloads that don't bring their own timeout
    pub download_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            drain_debounce: Duration::from_millis(500),
            max_batch_size: 500,
            secs_per_identifier: 3,
            contacts_timeout: Duration::from_secs(3000),
            publish_timeout: Duration::from_secs(10),
            download_timeout: Duration::from_secs(12),
        }
    }
}

impl WorkerConfig {
    pub fn with_drain_debounce(mut self, delay: Duration) -> Self {
        self.drain_debounce = delay;
        self
    }

    pub fn with_max_batch_size(mut self, size: usize) -> Self {
        // a zero sized batch would never drain anything
        self.max_batch_size = size.max(1);
        self
    }

    pub fn with_secs_per_identifier(mut self, secs: u64) -> Self {
        self.secs_per_identifier = secs;
        self
    }

    pub fn with_contacts_timeout(mut self, timeout: Duration) -> Self {
        self.contacts_timeout = timeout;
        self
    }

    pub fn with_publish_timeout(mut self, timeout: Duration) -> Self {
        self.publish_timeout = timeout;
        self
    }

    pub fn with_download_timeout(mut self, timeout: Duration) -> Self {
        self.download_timeout = timeout;
        self
    }
}
