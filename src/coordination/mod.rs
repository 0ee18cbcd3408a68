//! Coordination of one transaction attempt from build to delivery
//!
//! The coordination layer:
//! 1. Builds the origin call from a fresh quote
//! 2. Submits it and interprets the origin receipt per transaction type
//! 3. Tracks extracted cross-chain messages until delivered
//! 4. Surfaces user-visible notifications

pub mod builder;
pub mod coordinator;
pub mod session;
pub mod tracker;

pub use builder::{BuildRequest, CallBuilder};
pub use coordinator::ExecutionCoordinator;
pub use session::Session;
pub use tracker::{DeliveryEvent, TrackerSet};

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::broadcast;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Info,
    Success,
    Error,
}

impl NotificationLevel {
    pub fn name(&self) -> &'static str {
        match self {
            NotificationLevel::Info => "info",
            NotificationLevel::Success => "success",
            NotificationLevel::Error => "error",
        }
    }
}

/// A toast for the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub level: NotificationLevel,
    pub title: String,
    pub message: String,
    pub attempt_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
}

/// Broadcasts notifications and keeps the most recent ones
pub struct Notifier {
    sender: broadcast::Sender<Notification>,
    history: Mutex<VecDeque<Notification>>,
    capacity: usize,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            history: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn notify(
        &self,
        level: NotificationLevel,
        title: impl Into<String>,
        message: impl Into<String>,
        attempt_id: Option<Uuid>,
    ) {
        let notification = Notification {
            level,
            title: title.into(),
            message: message.into(),
            attempt_id,
            timestamp: Utc::now(),
        };

        crate::metrics::record_notification(level.name());

        {
            let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());
            if history.len() == self.capacity {
                history.pop_front();
            }
            history.push_back(notification.clone());
        }

        // No subscribers is fine; history still has it
        let _ = self.sender.send(notification);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }

    /// Most recent notifications, oldest first
    pub fn recent(&self) -> Vec<Notification> {
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }
}
