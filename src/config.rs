/// Configuration for a CinderDB store.
#[derive(Debug, Clone)]
pub struct Options {
    /// How many iterator steps the executor takes between cancellation
    /// checks (default: 128).
    pub cancel_check_interval: usize,

    /// Maximum number of serialization buffers retained by a table's
    /// buffer pool (default: 32).
    pub buffer_pool_size: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            cancel_check_interval: 128,
            buffer_pool_size: 32,
        }
    }
}

impl Options {
    /// Create options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the executor's cancellation check interval.
    pub fn cancel_check_interval(mut self, steps: usize) -> Self {
        self.cancel_check_interval = steps.max(1);
        self
    }

    /// Set the buffer pool retention limit.
    pub fn buffer_pool_size(mut self, buffers: usize) -> Self {
        self.buffer_pool_size = buffers;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = Options::default();
        assert_eq!(options.cancel_check_interval, 128);
        assert_eq!(options.buffer_pool_size, 32);
    }

    #[test]
    fn test_options_builder() {
        let options = Options::new().cancel_check_interval(16).buffer_pool_size(4);
        assert_eq!(options.cancel_check_interval, 16);
        assert_eq!(options.buffer_pool_size, 4);
    }

    #[test]
    fn test_cancel_check_interval_floor() {
        let options = Options::new().cancel_check_interval(0);
        assert_eq!(options.cancel_check_interval, 1);
    }
}
