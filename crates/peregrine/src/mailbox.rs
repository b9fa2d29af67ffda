//! Per-place message store, keyed by sender agent id

use peregrine_proto::AgentId;
use std::collections::BTreeMap;
use tokio::sync::Mutex;

/// Mailbox shared by all agents resident at one place
///
/// Messages are kept per sender in send order and drained wholesale:
/// `drain` empties the entire mailbox for ALL senders, regardless of which
/// agent asked. That cross-recipient drain is inherited behavior, kept
/// deliberately; see DESIGN.md before relying on it.
#[derive(Default)]
pub struct Mailbox {
    entries: Mutex<BTreeMap<AgentId, Vec<String>>>,
}

impl Mailbox {
    /// Create an empty mailbox
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message under the sender's entry, creating it if absent
    pub async fn push(&self, sender: AgentId, message: impl Into<String>) {
        let mut entries = self.entries.lock().await;
        entries.entry(sender).or_default().push(message.into());
    }

    /// Atomically capture and clear the whole mailbox, formatted as text
    ///
    /// Each sender's messages appear grouped under a `Messages from agent N:`
    /// header in send order, senders in ascending id order. Returns the empty
    /// string when there is nothing to drain, as does a second immediate call.
    pub async fn drain(&self) -> String {
        let drained = {
            let mut entries = self.entries.lock().await;
            std::mem::take(&mut *entries)
        };

        let mut text = String::new();
        for (sender, messages) in drained {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(&format!("Messages from agent {}:", sender));
            for message in messages {
                text.push('\n');
                text.push_str(&message);
            }
        }
        text
    }
}
