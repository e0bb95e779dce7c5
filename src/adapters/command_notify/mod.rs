// Command notify adapter - Hands notifications to an external program

use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{info, warn};

use crate::domain::errors::*;
use crate::ports::*;
use crate::utils::process;

const NOTIFY_TIMEOUT: Duration = Duration::from_secs(15);

/// Runs `program args...` with `{title}` and `{message}` substituted in each argument,
/// e.g. `["notify-send", "{title}", "{message}"]`. No shell is involved.
pub struct CommandNotifyAdapter {
    argv: Vec<String>,
}

impl CommandNotifyAdapter {
    pub fn new(argv: Vec<String>) -> Result<Self, DomainError> {
        if argv.first().map(|p| p.trim().is_empty()).unwrap_or(true) {
            return Err(DomainError::Configuration(
                "notify_command needs at least a program name".to_string(),
            ));
        }
        Ok(Self { argv })
    }

    /// Arguments after substitution, program first
    pub fn render(&self, title: &str, message: &str) -> Vec<String> {
        self.argv
            .iter()
            .map(|arg| arg.replace("{title}", title).replace("{message}", message))
            .collect()
    }
}

#[async_trait]
impl NotifyPort for CommandNotifyAdapter {
    async fn notify(&self, title: &str, message: &str) {
        info!(notification = %title, "{}", message);

        let argv = self.render(title, message);
        let mut command = Command::new(&argv[0]);
        command.args(&argv[1..]);
        match process::capture(command, Some(NOTIFY_TIMEOUT)).await {
            Ok(output) if output.success() => {}
            Ok(output) => warn!("Notification command failed: {}", output.diagnostic()),
            Err(e) => warn!("Notification command could not run: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_substitutes_placeholders() {
        let notifier = CommandNotifyAdapter::new(vec![
            "notify-send".to_string(),
            "{title}".to_string(),
            "run: {message}".to_string(),
        ])
        .unwrap();
        assert_eq!(
            notifier.render("Target reached", "iteration 3"),
            vec!["notify-send", "Target reached", "run: iteration 3"]
        );
    }

    #[test]
    fn test_empty_command_is_rejected() {
        assert!(CommandNotifyAdapter::new(vec![]).is_err());
        assert!(CommandNotifyAdapter::new(vec![" ".to_string()]).is_err());
    }

    #[tokio::test]
    async fn test_failing_command_does_not_propagate() {
        let notifier =
            CommandNotifyAdapter::new(vec!["/nonexistent/notifier".to_string()]).unwrap();
        notifier.notify("title", "message").await;
    }
}
