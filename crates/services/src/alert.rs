/// Channel for conditions the operator must see because the app cannot work
/// until they are dealt with (store unavailable, reset blocked).
pub trait Alert: Send + Sync {
    fn alert(&self, message: &str);
}

/// Default sink: reports alerts through `tracing` at error level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAlert;

impl Alert for LogAlert {
    fn alert(&self, message: &str) {
        tracing::error!(alert = true, "{message}");
    }
}
