// Test utilities for services crate
#![cfg(test)]

use crate::auth::{
    events::{LoginSubscriber, UserLoggedIn, UserLoggedOut},
    ports::{ResponseHeaders, SessionService},
};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

/// Session service whose headers name the principal in clear
pub struct MockSessionService;

impl SessionService for MockSessionService {
    fn remember(&self, principal: &str) -> ResponseHeaders {
        vec![(
            "Set-Cookie".to_string(),
            format!("auth_tkt={principal}; Path=/"),
        )]
    }

    fn forget(&self) -> ResponseHeaders {
        vec![(
            "Set-Cookie".to_string(),
            "auth_tkt=; Max-Age=0; Path=/".to_string(),
        )]
    }
}

pub type EventLog = Arc<Mutex<Vec<String>>>;

/// Records `<name>:in:<principal>` and `<name>:out:<principal>` lines
pub struct RecordingSubscriber {
    name: String,
    log: EventLog,
}

impl RecordingSubscriber {
    pub fn new(name: &str, log: EventLog) -> Self {
        Self {
            name: name.to_string(),
            log,
        }
    }

    pub fn shared_log() -> EventLog {
        Arc::new(Mutex::new(Vec::new()))
    }
}

#[async_trait]
impl LoginSubscriber for RecordingSubscriber {
    async fn user_logged_in(&self, event: &mut UserLoggedIn) -> anyhow::Result<()> {
        self.log
            .lock()
            .unwrap()
            .push(format!("{}:in:{}", self.name, event.principal));
        Ok(())
    }

    async fn user_logged_out(&self, event: &UserLoggedOut) -> anyhow::Result<()> {
        self.log
            .lock()
            .unwrap()
            .push(format!("{}:out:{}", self.name, event.principal));
        Ok(())
    }
}

pub struct FailingSubscriber;

#[async_trait]
impl LoginSubscriber for FailingSubscriber {
    async fn user_logged_in(&self, _event: &mut UserLoggedIn) -> anyhow::Result<()> {
        anyhow::bail!("database unavailable: postgres://admin:hunter2@db")
    }

    async fn user_logged_out(&self, _event: &UserLoggedOut) -> anyhow::Result<()> {
        anyhow::bail!("database unavailable")
    }
}

pub struct PanickingSubscriber;

#[async_trait]
impl LoginSubscriber for PanickingSubscriber {
    async fn user_logged_in(&self, _event: &mut UserLoggedIn) -> anyhow::Result<()> {
        panic!("subscriber bug")
    }

    async fn user_logged_out(&self, _event: &UserLoggedOut) -> anyhow::Result<()> {
        panic!("subscriber bug")
    }
}

/// Replaces the session headers of every login
pub struct HeaderOverrideSubscriber {
    headers: ResponseHeaders,
}

impl HeaderOverrideSubscriber {
    pub fn new(headers: ResponseHeaders) -> Self {
        Self { headers }
    }
}

#[async_trait]
impl LoginSubscriber for HeaderOverrideSubscriber {
    async fn user_logged_in(&self, event: &mut UserLoggedIn) -> anyhow::Result<()> {
        event.headers = Some(self.headers.clone());
        Ok(())
    }
}
