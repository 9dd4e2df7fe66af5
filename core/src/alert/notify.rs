// Notifier — the external notification sink capability
//
// The core only composes notifications; delivery (mail, webhook, pager) is a
// collaborator behind this trait.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub subject: String,
    pub body: String,
}

impl Notification {
    pub fn new(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification sink failure: {0}")]
    Sink(String),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError>;
}
