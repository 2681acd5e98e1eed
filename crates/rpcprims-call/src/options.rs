/// Per-method call behavior.
#[derive(Debug, Clone)]
pub struct CallOptions {
    /// Report the text of unclassified handler faults to the client.
    /// When disabled a fixed message is sent instead. Default: true.
    pub detailed_errors: bool,
    /// Maximum request message size in bytes. Default: unlimited.
    pub max_receive_message_size: Option<usize>,
    /// Maximum response message size in bytes. Default: unlimited.
    pub max_send_message_size: Option<usize>,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            detailed_errors: true,
            max_receive_message_size: None,
            max_send_message_size: None,
        }
    }
}

impl CallOptions {
    /// Toggle detailed fault messages.
    pub fn with_detailed_errors(mut self, enabled: bool) -> Self {
        self.detailed_errors = enabled;
        self
    }

    /// Limit request messages to `max` bytes.
    pub fn with_max_receive_message_size(mut self, max: usize) -> Self {
        self.max_receive_message_size = Some(max);
        self
    }

    /// Limit response messages to `max` bytes.
    pub fn with_max_send_message_size(mut self, max: usize) -> Self {
        self.max_send_message_size = Some(max);
        self
    }
}
