//! JSON messages exchanged with the chat-platform adapter over the gateway socket.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Inbound {
    /// A chat message that may contain a command.
    Command {
        text: String,
        author: String,
        channel: String,
    },
    /// A button press on a message the node sent earlier.
    Action {
        action: String,
        actor: String,
        channel: String,
        /// Node-generated reference of the message carrying the button.
        message: String,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Button {
    pub id: String,
    pub label: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outbound {
    Send {
        #[serde(rename = "ref")]
        message_ref: String,
        channel: String,
        text: String,
        actions: Vec<Button>,
    },
    Edit {
        #[serde(rename = "ref")]
        message_ref: String,
        channel: String,
        text: String,
        actions: Vec<Button>,
    },
}

/// Rendered message content, before it is addressed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub actions: Vec<Button>,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            actions: Vec::new(),
        }
    }

    pub fn with_action(mut self, id: impl ToString, label: impl Into<String>) -> Self {
        self.actions.push(Button {
            id: id.to_string(),
            label: label.into(),
        });
        self
    }
}

/// Queue of outbound messages for one adapter connection (or for all of them).
#[derive(Clone, Debug)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl Outbox {
    pub fn new(tx: mpsc::UnboundedSender<Outbound>) -> Self {
        Self { tx }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Sends a new message and returns its reference.
    pub fn send(&self, channel: &str, reply: Reply) -> String {
        let message_ref = Uuid::new_v4().to_string();
        let _ = self.tx.send(Outbound::Send {
            message_ref: message_ref.clone(),
            channel: channel.to_string(),
            text: reply.text,
            actions: reply.actions,
        });
        message_ref
    }

    pub fn edit(&self, channel: &str, message_ref: &str, reply: Reply) {
        let _ = self.tx.send(Outbound::Edit {
            message_ref: message_ref.to_string(),
            channel: channel.to_string(),
            text: reply.text,
            actions: reply.actions,
        });
    }
}
