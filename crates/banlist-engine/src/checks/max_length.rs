//! Limit on message body length.

use std::collections::HashSet;

use banlist_core::{RawRecord, UserId};

use super::EventCheck;
use crate::config::MessageMaxLengthSection;

pub struct MessageMaxLength {
    server_name: String,
    threshold: Option<usize>,
    rooms: HashSet<String>,
    remote_servers: bool,
}

impl MessageMaxLength {
    pub fn new(server_name: impl Into<String>, section: &MessageMaxLengthSection) -> Self {
        Self {
            server_name: server_name.into(),
            threshold: section.threshold,
            rooms: section.rooms.iter().cloned().collect(),
            remote_servers: section.remote_servers,
        }
    }

    fn applies_to_sender(&self, sender: &str) -> bool {
        if self.remote_servers {
            return true;
        }
        UserId::parse(sender).is_ok_and(|u| u.domain() == self.server_name)
    }
}

impl EventCheck for MessageMaxLength {
    fn name(&self) -> &'static str {
        "message_max_length"
    }

    fn check_event_for_spam(&self, event: &RawRecord) -> bool {
        let Some(threshold) = self.threshold else {
            return false;
        };
        if !self.applies_to_sender(&event.sender) {
            return false;
        }

        let body = event.content_str("body").unwrap_or("");
        if body.chars().count() <= threshold {
            return false;
        }
        self.rooms.is_empty() || self.rooms.contains(&event.room_id)
    }
}
