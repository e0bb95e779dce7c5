// Tracing log adapter - Notifications as structured log events

use async_trait::async_trait;
use tracing::info;

use crate::ports::*;

/// Notifier that only writes to the log
#[derive(Debug, Default)]
pub struct TracingNotifyAdapter;

impl TracingNotifyAdapter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NotifyPort for TracingNotifyAdapter {
    async fn notify(&self, title: &str, message: &str) {
        info!(notification = %title, "{}", message);
    }
}
