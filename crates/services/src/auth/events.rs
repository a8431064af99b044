//! Login and logout notifications for host application subscribers.
//!
//! Subscribers run in registration order, awaited one after another on the request
//! task. A login subscriber may replace the session headers of the response by
//! setting [`UserLoggedIn::headers`].

use super::ports::{OAuth2Tokens, ResponseHeaders, UserInfo};
use async_trait::async_trait;
use futures::FutureExt;
use std::{panic::AssertUnwindSafe, sync::Arc};
use tracing::{debug, error, info};

/// Emitted once per successful callback, before the response is built
#[derive(Debug, Clone)]
pub struct UserLoggedIn {
    pub principal: String,
    pub tokens: OAuth2Tokens,
    pub userinfo: UserInfo,
    /// Replacement session headers. Used only when set and non-empty.
    pub headers: Option<ResponseHeaders>,
}

impl UserLoggedIn {
    pub fn new(principal: impl Into<String>, tokens: OAuth2Tokens, userinfo: UserInfo) -> Self {
        Self {
            principal: principal.into(),
            tokens,
            userinfo,
            headers: None,
        }
    }

    /// Headers set by a subscriber, ignoring an empty replacement
    pub fn override_headers(&self) -> Option<&ResponseHeaders> {
        self.headers.as_ref().filter(|headers| !headers.is_empty())
    }
}

/// Emitted when an authenticated user logs out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserLoggedOut {
    pub principal: String,
}

impl UserLoggedOut {
    pub fn new(principal: impl Into<String>) -> Self {
        Self {
            principal: principal.into(),
        }
    }
}

#[async_trait]
pub trait LoginSubscriber: Send + Sync {
    async fn user_logged_in(&self, _event: &mut UserLoggedIn) -> anyhow::Result<()> {
        Ok(())
    }

    async fn user_logged_out(&self, _event: &UserLoggedOut) -> anyhow::Result<()> {
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Subscriber {index} failed: {source}")]
    SubscriberFailed {
        index: usize,
        #[source]
        source: anyhow::Error,
    },

    #[error("Subscriber {index} panicked")]
    SubscriberPanicked { index: usize },
}

#[derive(Clone, Default)]
pub struct EventNotifier {
    subscribers: Vec<Arc<dyn LoginSubscriber>>,
}

impl EventNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, subscriber: Arc<dyn LoginSubscriber>) {
        self.subscribers.push(subscriber);
    }

    pub fn with_subscriber(mut self, subscriber: Arc<dyn LoginSubscriber>) -> Self {
        self.subscribe(subscriber);
        self
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Deliver a login to every subscriber. The first failure stops delivery.
    pub async fn notify_logged_in(&self, event: &mut UserLoggedIn) -> Result<(), NotifyError> {
        for (index, subscriber) in self.subscribers.iter().enumerate() {
            debug!(index, "Delivering login event");
            let outcome = AssertUnwindSafe(subscriber.user_logged_in(event))
                .catch_unwind()
                .await;
            Self::check(index, outcome)?;
        }
        Ok(())
    }

    /// Deliver a logout to every subscriber. The first failure stops delivery.
    pub async fn notify_logged_out(&self, event: &UserLoggedOut) -> Result<(), NotifyError> {
        for (index, subscriber) in self.subscribers.iter().enumerate() {
            debug!(index, "Delivering logout event");
            let outcome = AssertUnwindSafe(subscriber.user_logged_out(event))
                .catch_unwind()
                .await;
            Self::check(index, outcome)?;
        }
        Ok(())
    }

    fn check(
        index: usize,
        outcome: std::thread::Result<anyhow::Result<()>>,
    ) -> Result<(), NotifyError> {
        match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(source)) => {
                error!(index, "Login event subscriber failed");
                Err(NotifyError::SubscriberFailed { index, source })
            }
            Err(_) => {
                error!(index, "Login event subscriber panicked");
                Err(NotifyError::SubscriberPanicked { index })
            }
        }
    }
}

/// Writes an audit line for every login and logout
#[derive(Debug, Default)]
pub struct AuditLogSubscriber;

#[async_trait]
impl LoginSubscriber for AuditLogSubscriber {
    async fn user_logged_in(&self, event: &mut UserLoggedIn) -> anyhow::Result<()> {
        let hosted_domain = event.userinfo.claim("hd");
        info!(
            principal = %event.principal,
            hosted_domain = hosted_domain.as_deref().unwrap_or("-"),
            "User logged in with Google"
        );
        Ok(())
    }

    async fn user_logged_out(&self, event: &UserLoggedOut) -> anyhow::Result<()> {
        info!(principal = %event.principal, "User logged out");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{
        FailingSubscriber, HeaderOverrideSubscriber, PanickingSubscriber, RecordingSubscriber,
    };

    fn login_event() -> UserLoggedIn {
        UserLoggedIn::new(
            "bob@bob.com",
            OAuth2Tokens::new("ya29.token"),
            UserInfo::from(serde_json::json!({"email": "bob@bob.com"})),
        )
    }

    #[tokio::test]
    async fn test_subscribers_run_in_registration_order() {
        let log = RecordingSubscriber::shared_log();
        let notifier = EventNotifier::new()
            .with_subscriber(Arc::new(RecordingSubscriber::new("first", log.clone())))
            .with_subscriber(Arc::new(RecordingSubscriber::new("second", log.clone())));

        notifier.notify_logged_in(&mut login_event()).await.unwrap();
        notifier
            .notify_logged_out(&UserLoggedOut::new("bob@bob.com"))
            .await
            .unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "first:in:bob@bob.com",
                "second:in:bob@bob.com",
                "first:out:bob@bob.com",
                "second:out:bob@bob.com",
            ]
        );
    }

    #[tokio::test]
    async fn test_no_subscribers() {
        let notifier = EventNotifier::new();
        assert!(notifier.is_empty());
        notifier.notify_logged_in(&mut login_event()).await.unwrap();
    }

    #[tokio::test]
    async fn test_subscriber_can_replace_headers() {
        let notifier = EventNotifier::new().with_subscriber(Arc::new(
            HeaderOverrideSubscriber::new(vec![("X-Test".to_string(), "Yes".to_string())]),
        ));

        let mut event = login_event();
        notifier.notify_logged_in(&mut event).await.unwrap();

        assert_eq!(
            event.override_headers(),
            Some(&vec![("X-Test".to_string(), "Yes".to_string())])
        );
    }

    #[test]
    fn test_empty_override_is_ignored() {
        let mut event = login_event();
        event.headers = Some(Vec::new());
        assert_eq!(event.override_headers(), None);
    }

    #[tokio::test]
    async fn test_failure_stops_delivery() {
        let log = RecordingSubscriber::shared_log();
        let notifier = EventNotifier::new()
            .with_subscriber(Arc::new(FailingSubscriber))
            .with_subscriber(Arc::new(RecordingSubscriber::new("after", log.clone())));

        let err = notifier
            .notify_logged_in(&mut login_event())
            .await
            .unwrap_err();

        assert!(matches!(err, NotifyError::SubscriberFailed { index: 0, .. }));
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_panicking_subscriber_is_contained() {
        let notifier = EventNotifier::new()
            .with_subscriber(Arc::new(AuditLogSubscriber))
            .with_subscriber(Arc::new(PanickingSubscriber));

        let err = notifier
            .notify_logged_in(&mut login_event())
            .await
            .unwrap_err();
        assert!(matches!(err, NotifyError::SubscriberPanicked { index: 1 }));

        let err = notifier
            .notify_logged_out(&UserLoggedOut::new("bob@bob.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, NotifyError::SubscriberPanicked { index: 1 }));
    }
}
