use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::priority::Priority;

/// Purpose tag of a bus message.
///
/// Serialized as its snake_case string so that persisted logs stay readable
/// and unknown tags from other producers survive as [`Intent::Custom`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Intent {
    Task,
    FusionRequest,
    FusionResponse,
    AgentResurrected,
    Custom(String),
}

impl Intent {
    pub fn as_str(&self) -> &str {
        match self {
            Intent::Task => "task",
            Intent::FusionRequest => "fusion_request",
            Intent::FusionResponse => "fusion_response",
            Intent::AgentResurrected => "agent_resurrected",
            Intent::Custom(tag) => tag,
        }
    }
}

impl From<&str> for Intent {
    fn from(tag: &str) -> Self {
        match tag {
            "task" => Intent::Task,
            "fusion_request" => Intent::FusionRequest,
            "fusion_response" => Intent::FusionResponse,
            "agent_resurrected" => Intent::AgentResurrected,
            other => Intent::Custom(other.to_string()),
        }
    }
}

impl FromStr for Intent {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Intent::from(s))
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Intent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Intent {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Ok(Intent::from(tag.as_str()))
    }
}

/// Delivery status of a message. Only ever advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Sent,
    Delivered,
    Processed,
    Error,
}

impl MessageStatus {
    fn rank(self) -> u8 {
        match self {
            MessageStatus::Sent => 0,
            MessageStatus::Delivered => 1,
            // both terminal
            MessageStatus::Processed | MessageStatus::Error => 2,
        }
    }

    /// Whether moving from `self` to `next` is a forward step
    pub fn can_advance_to(self, next: MessageStatus) -> bool {
        next.rank() > self.rank()
    }

    pub fn is_terminal(self) -> bool {
        self.rank() == 2
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MessageStatus::Sent => "sent",
            MessageStatus::Delivered => "delivered",
            MessageStatus::Processed => "processed",
            MessageStatus::Error => "error",
        }
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sent" => Ok(MessageStatus::Sent),
            "delivered" => Ok(MessageStatus::Delivered),
            "processed" => Ok(MessageStatus::Processed),
            "error" => Ok(MessageStatus::Error),
            other => Err(format!("unknown message status: {other}")),
        }
    }
}

/// A message exchanged between two named agents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub sender: String,
    pub receiver: String,
    pub intent: Intent,
    pub payload: Value,
    pub priority: Priority,
    pub status: MessageStatus,
    #[serde(rename = "timestamp")]
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(
        sender: impl Into<String>,
        receiver: impl Into<String>,
        intent: Intent,
        payload: Value,
        priority: Priority,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            sender: sender.into(),
            receiver: receiver.into(),
            intent,
            payload,
            priority,
            status: MessageStatus::Sent,
            created_at: Utc::now(),
        }
    }

    /// True when the agent is either end of this message
    pub fn involves(&self, agent: &str) -> bool {
        self.sender == agent || self.receiver == agent
    }
}
