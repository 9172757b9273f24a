//! The minimal output-sink contract the core writes through.
//!
//! Message routing to stdout/stderr/file/syslog and a printf-style
//! formatter are external collaborators; only the seam they plug into is
//! defined here. Callers that just want the simplest possible sink can use
//! [`NullSink`] or [`TracingSink`].

/// Accepts opaque message blobs. Implementors decide the destination.
pub trait MessageSink: Send + Sync {
    /// Writes `message` to the sink. Implementations should not panic;
    /// a sink that cannot currently accept a message should drop it.
    fn write(&self, message: &[u8]);
}

/// A debug sink with an integer verbosity threshold, as used by
/// `--debug <n>` in the supervisor's CLI.
pub trait DebugSink: Send + Sync {
    /// The configured verbosity threshold.
    fn threshold(&self) -> u32;

    /// Writes `message` if `level` is at or below [`DebugSink::threshold`].
    fn write(&self, level: u32, message: &[u8]);
}

/// A sink that discards everything written to it.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl MessageSink for NullSink {
    fn write(&self, _message: &[u8]) {}
}

impl DebugSink for NullSink {
    fn threshold(&self) -> u32 {
        0
    }

    fn write(&self, _level: u32, _message: &[u8]) {}
}

/// A sink that forwards messages to `tracing`, the way `supervisord` routes
/// its own diagnostics.
#[derive(Debug, Clone, Copy)]
pub struct TracingSink {
    threshold: u32,
}

impl TracingSink {
    /// Builds a sink that emits debug messages at or below `threshold`.
    #[must_use]
    pub const fn new(threshold: u32) -> Self {
        Self { threshold }
    }
}

impl MessageSink for TracingSink {
    fn write(&self, message: &[u8]) {
        tracing::info!(message = %String::from_utf8_lossy(message));
    }
}

impl DebugSink for TracingSink {
    fn threshold(&self) -> u32 {
        self.threshold
    }

    fn write(&self, level: u32, message: &[u8]) {
        if level <= self.threshold {
            tracing::debug!(level, message = %String::from_utf8_lossy(message));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::mock;

    #[test]
    fn null_sink_accepts_anything() {
        let sink = NullSink;
        MessageSink::write(&sink, b"hello");
        DebugSink::write(&sink, 5, b"hello");
        assert_eq!(DebugSink::threshold(&sink), 0);
    }

    #[test]
    fn tracing_sink_reports_its_threshold() {
        let sink = TracingSink::new(3);
        assert_eq!(sink.threshold(), 3);
    }

    mock! {
        RecordingSink {}
        impl MessageSink for RecordingSink {
            fn write(&self, message: &[u8]);
        }
    }

    #[test]
    fn callers_only_ever_see_the_message_sink_trait_object() {
        let mut mock = MockRecordingSink::new();
        mock.expect_write()
            .times(1)
            .withf(|message: &[u8]| message == b"hello")
            .return_const(());

        let sink: &dyn MessageSink = &mock;
        sink.write(b"hello");
    }
}
