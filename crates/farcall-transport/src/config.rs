use std::time::Duration;

const DEFAULT_STREAM_CHUNK_SIZE: usize = 32 * 1024;
const DEFAULT_STREAM_BUFFER: usize = 16;
const DEFAULT_REQUEST_QUEUE: usize = 256;

/// Tuning knobs shared by a dispatcher and the host it talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    call_timeout: Option<Duration>,
    stream_chunk_size: usize,
    stream_buffer: usize,
    request_queue: usize,
}

impl DispatcherConfig {
    /// Creates a new configuration builder with default settings.
    pub fn builder() -> DispatcherConfigBuilder {
        DispatcherConfigBuilder::default()
    }

    /// Upper bound on a single invocation round trip. `None` waits forever.
    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout
    }

    /// Largest chunk a data stream hands out at once.
    pub fn stream_chunk_size(&self) -> usize {
        self.stream_chunk_size
    }

    /// Chunks buffered between the host and a slow reader.
    pub fn stream_buffer(&self) -> usize {
        self.stream_buffer
    }

    /// Requests queued towards the host before callers start waiting.
    pub fn request_queue(&self) -> usize {
        self.request_queue
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Builder for `DispatcherConfig`.
#[derive(Default)]
pub struct DispatcherConfigBuilder {
    call_timeout: Option<Duration>,
    stream_chunk_size: Option<usize>,
    stream_buffer: Option<usize>,
    request_queue: Option<usize>,
}

impl DispatcherConfigBuilder {
    /// Fails calls with a timeout error after `timeout` (default: no timeout).
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    /// Sets the stream chunk size in bytes (default: 32 KiB).
    pub fn stream_chunk_size(mut self, bytes: usize) -> Self {
        self.stream_chunk_size = Some(bytes);
        self
    }

    /// Sets how many chunks may be in flight per stream (default: 16).
    pub fn stream_buffer(mut self, chunks: usize) -> Self {
        self.stream_buffer = Some(chunks);
        self
    }

    /// Sets the request queue depth (default: 256).
    pub fn request_queue(mut self, depth: usize) -> Self {
        self.request_queue = Some(depth);
        self
    }

    /// Builds the configuration. Zero sizes are raised to 1.
    pub fn build(self) -> DispatcherConfig {
        DispatcherConfig {
            call_timeout: self.call_timeout,
            stream_chunk_size: self
                .stream_chunk_size
                .unwrap_or(DEFAULT_STREAM_CHUNK_SIZE)
                .max(1),
            stream_buffer: self.stream_buffer.unwrap_or(DEFAULT_STREAM_BUFFER).max(1),
            request_queue: self.request_queue.unwrap_or(DEFAULT_REQUEST_QUEUE).max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DispatcherConfig::default();
        assert_eq!(config.call_timeout(), None);
        assert_eq!(config.stream_chunk_size(), 32 * 1024);
        assert_eq!(config.stream_buffer(), 16);
        assert_eq!(config.request_queue(), 256);
    }

    #[test]
    fn test_zero_sizes_are_clamped() {
        let config = DispatcherConfig::builder()
            .stream_chunk_size(0)
            .stream_buffer(0)
            .request_queue(0)
            .call_timeout(Duration::from_millis(250))
            .build();
        assert_eq!(config.stream_chunk_size(), 1);
        assert_eq!(config.stream_buffer(), 1);
        assert_eq!(config.request_queue(), 1);
        assert_eq!(config.call_timeout(), Some(Duration::from_millis(250)));
    }
}
