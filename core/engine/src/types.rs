use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// 会话状态标签（封闭集合）
///
/// 由调用方（会话 / 传输层）在两轮对话之间保存，引擎本身不持有任何会话状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
    #[default]
    General,
    AwaitingEmail,
    AwaitingOrderNumber,
    AwaitingFlightInfo,
    HasEmail,
}

impl ConversationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationState::General => "general",
            ConversationState::AwaitingEmail => "awaiting_email",
            ConversationState::AwaitingOrderNumber => "awaiting_order_number",
            ConversationState::AwaitingFlightInfo => "awaiting_flight_info",
            ConversationState::HasEmail => "has_email",
        }
    }

    pub fn all() -> &'static [ConversationState] {
        &[
            ConversationState::General,
            ConversationState::AwaitingEmail,
            ConversationState::AwaitingOrderNumber,
            ConversationState::AwaitingFlightInfo,
            ConversationState::HasEmail,
        ]
    }

    /// 字符串边界上的宽松解析：未知标签一律回到 `general`
    pub fn parse_lenient(tag: &str) -> Self {
        match tag.parse() {
            Ok(state) => state,
            Err(_) => {
                tracing::warn!(tag, "unknown conversation state tag, falling back to general");
                ConversationState::General
            }
        }
    }
}

impl Display for ConversationState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStateTag(pub String);

impl Display for UnknownStateTag {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown conversation state tag: {:?}", self.0)
    }
}

impl std::error::Error for UnknownStateTag {}

impl FromStr for ConversationState {
    type Err = UnknownStateTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConversationState::all()
            .iter()
            .copied()
            .find(|state| state.as_str() == s.trim())
            .ok_or_else(|| UnknownStateTag(s.to_string()))
    }
}

/// 一轮对话的输出：回复文本 + 新的会话状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnReply {
    pub reply: String,
    pub state: ConversationState,
}

impl TurnReply {
    pub fn new(reply: impl Into<String>, state: ConversationState) -> Self {
        Self {
            reply: reply.into(),
            state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_round_trip_through_from_str() {
        for state in ConversationState::all() {
            assert_eq!(state.as_str().parse::<ConversationState>().unwrap(), *state);
        }
    }

    #[test]
    fn serde_uses_snake_case_tags() {
        let json = serde_json::to_string(&ConversationState::AwaitingOrderNumber).unwrap();
        assert_eq!(json, "\"awaiting_order_number\"");
    }

    #[test]
    fn unknown_tag_falls_back_to_general() {
        assert!("awaiting_pizza".parse::<ConversationState>().is_err());
        assert_eq!(ConversationState::parse_lenient("awaiting_pizza"), ConversationState::General);
        assert_eq!(ConversationState::default(), ConversationState::General);
    }
}
