use rand::{Rng, RngCore};
use regex::Regex;

use crate::error::{EngineError, EngineResult};
use crate::types::{ConversationState, TurnReply};

pub const GREETING_REPLIES: [&str; 3] = [
    "Hello! How can I help you today?",
    "Hi there! What can I do for you?",
    "Hello, thanks for reaching out. How may I assist?",
];
pub const FAREWELL_REPLY: &str = "Thank you for chatting with me. Goodbye!";
pub const EMAIL_RECEIVED_REPLY: &str =
    "Thank you. I have your contact information now. How can I assist you further?";
pub const EMAIL_REPROMPT_REPLY: &str =
    "I'll need a valid email address to proceed. Could you please provide it?";
pub const INVALID_ORDER_REPLY: &str =
    "I'm sorry, that doesn't look like a valid order number. It should be at least 5 digits long.";
pub const CANCELLATION_ABORTED_REPLY: &str =
    "Cancellation has been aborted. Is there anything else I can help with?";
pub const ORDER_PROMPT_REPLY: &str =
    "I can help with that. Could you please provide your order number?";
pub const FLIGHT_CONFIRM_PROMPT_REPLY: &str = "I can certainly help with that. Are you sure you want to cancel your flight? Please respond with 'yes' to confirm.";

const GREETING_PATTERNS: [&str; 5] = [
    r"\bhello\b",
    r"\bhi\b",
    r"\bhey\b",
    r"good morning",
    r"good afternoon",
];
const FAREWELL_KEYWORDS: [&str; 4] = ["bye", "goodbye", "see you", "farewell"];
/// 模型回复里出现这些词时，`general` 转入 `awaiting_email`
const EMAIL_HINTS: [&str; 3] = ["email", "dm", "direct message"];

/// 一轮输入：原文 + 小写形式 + 本轮开始时的会话状态
pub struct TurnInput<'a> {
    pub text: &'a str,
    pub lowered: String,
    pub state: ConversationState,
}

impl<'a> TurnInput<'a> {
    pub fn new(text: &'a str, state: ConversationState) -> Self {
        Self {
            text,
            lowered: text.to_lowercase(),
            state,
        }
    }
}

/// 一条规则 = 谓词 + 处理；返回 `None` 表示不匹配，交给下一条
pub trait TurnRule: Send + Sync {
    fn name(&self) -> &'static str;

    fn apply(&self, turn: &TurnInput<'_>, rng: &mut dyn RngCore) -> Option<TurnReply>;
}

pub struct GreetingRule {
    patterns: Vec<Regex>,
}

impl GreetingRule {
    pub fn new() -> EngineResult<Self> {
        let patterns = GREETING_PATTERNS
            .iter()
            .map(|p| compile(p))
            .collect::<EngineResult<Vec<_>>>()?;
        Ok(Self { patterns })
    }
}

impl TurnRule for GreetingRule {
    fn name(&self) -> &'static str {
        "greeting"
    }

    fn apply(&self, turn: &TurnInput<'_>, rng: &mut dyn RngCore) -> Option<TurnReply> {
        if !self.patterns.iter().any(|p| p.is_match(&turn.lowered)) {
            return None;
        }
        let reply = GREETING_REPLIES[rng.gen_range(0..GREETING_REPLIES.len())];
        Some(TurnReply::new(reply, ConversationState::General))
    }
}

pub struct FarewellRule;

impl TurnRule for FarewellRule {
    fn name(&self) -> &'static str {
        "farewell"
    }

    fn apply(&self, turn: &TurnInput<'_>, _rng: &mut dyn RngCore) -> Option<TurnReply> {
        FAREWELL_KEYWORDS
            .iter()
            .any(|k| turn.lowered.contains(k))
            .then(|| TurnReply::new(FAREWELL_REPLY, ConversationState::General))
    }
}

/// `awaiting_email`：收邮箱
pub struct EmailCaptureRule {
    email: Regex,
}

impl EmailCaptureRule {
    pub fn new() -> EngineResult<Self> {
        Ok(Self {
            email: compile(r"\S+@\S+")?,
        })
    }
}

impl TurnRule for EmailCaptureRule {
    fn name(&self) -> &'static str {
        "email_capture"
    }

    fn apply(&self, turn: &TurnInput<'_>, _rng: &mut dyn RngCore) -> Option<TurnReply> {
        if turn.state != ConversationState::AwaitingEmail {
            return None;
        }
        if self.email.is_match(turn.text) {
            Some(TurnReply::new(EMAIL_RECEIVED_REPLY, ConversationState::HasEmail))
        } else {
            Some(TurnReply::new(EMAIL_REPROMPT_REPLY, ConversationState::AwaitingEmail))
        }
    }
}

/// `awaiting_order_number`：至少 5 位的连续数字
pub struct OrderLookupRule {
    order_number: Regex,
}

impl OrderLookupRule {
    pub fn new() -> EngineResult<Self> {
        Ok(Self {
            order_number: compile(r"\d{5,}")?,
        })
    }
}

impl TurnRule for OrderLookupRule {
    fn name(&self) -> &'static str {
        "order_lookup"
    }

    fn apply(&self, turn: &TurnInput<'_>, _rng: &mut dyn RngCore) -> Option<TurnReply> {
        if turn.state != ConversationState::AwaitingOrderNumber {
            return None;
        }
        match self.order_number.find(turn.text) {
            Some(found) => Some(TurnReply::new(
                format!(
                    "Thank you. I've looked up order number {} and it is currently out for delivery.",
                    found.as_str()
                ),
                ConversationState::HasEmail,
            )),
            None => Some(TurnReply::new(
                INVALID_ORDER_REPLY,
                ConversationState::AwaitingOrderNumber,
            )),
        }
    }
}

/// `awaiting_flight_info`：确认取消；无论结果都回到 `has_email`
pub struct FlightCancellationRule;

impl TurnRule for FlightCancellationRule {
    fn name(&self) -> &'static str {
        "flight_cancellation"
    }

    fn apply(&self, turn: &TurnInput<'_>, rng: &mut dyn RngCore) -> Option<TurnReply> {
        if turn.state != ConversationState::AwaitingFlightInfo {
            return None;
        }
        if turn.lowered.contains("yes") {
            let confirmation: u32 = rng.gen_range(10000..=99999);
            Some(TurnReply::new(
                format!(
                    "Your flight has been successfully cancelled. Your confirmation number is {}.",
                    confirmation
                ),
                ConversationState::HasEmail,
            ))
        } else {
            Some(TurnReply::new(
                CANCELLATION_ABORTED_REPLY,
                ConversationState::HasEmail,
            ))
        }
    }
}

/// `has_email`：识别订单 / 航班意图，其余交给模型
pub struct AccountIntentRule;

impl TurnRule for AccountIntentRule {
    fn name(&self) -> &'static str {
        "account_intent"
    }

    fn apply(&self, turn: &TurnInput<'_>, _rng: &mut dyn RngCore) -> Option<TurnReply> {
        if turn.state != ConversationState::HasEmail {
            return None;
        }
        if turn.lowered.contains("order") {
            Some(TurnReply::new(
                ORDER_PROMPT_REPLY,
                ConversationState::AwaitingOrderNumber,
            ))
        } else if turn.lowered.contains("flight") || turn.lowered.contains("cancel") {
            Some(TurnReply::new(
                FLIGHT_CONFIRM_PROMPT_REPLY,
                ConversationState::AwaitingFlightInfo,
            ))
        } else {
            None
        }
    }
}

/// 规则命中结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleMatch {
    pub rule: &'static str,
    pub reply: TurnReply,
}

/// 按固定优先级排列的规则表，第一条命中即返回
pub struct RuleSet {
    rules: Vec<Box<dyn TurnRule>>,
}

impl RuleSet {
    pub fn new(rules: Vec<Box<dyn TurnRule>>) -> Self {
        Self { rules }
    }

    /// 问候 > 告别 > 各 awaiting_* 状态 > has_email 意图
    pub fn standard() -> EngineResult<Self> {
        Ok(Self::new(vec![
            Box::new(GreetingRule::new()?),
            Box::new(FarewellRule),
            Box::new(EmailCaptureRule::new()?),
            Box::new(OrderLookupRule::new()?),
            Box::new(FlightCancellationRule),
            Box::new(AccountIntentRule),
        ]))
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    pub fn evaluate(
        &self,
        text: &str,
        state: ConversationState,
        rng: &mut dyn RngCore,
    ) -> Option<RuleMatch> {
        let turn = TurnInput::new(text, state);
        self.rules.iter().find_map(|rule| {
            rule.apply(&turn, rng).map(|reply| RuleMatch {
                rule: rule.name(),
                reply,
            })
        })
    }
}

/// 模型兜底之后的状态转移（启发式，按子串判断，可能误判）
pub fn model_transition(previous: ConversationState, generated: &str) -> ConversationState {
    if previous == ConversationState::General && EMAIL_HINTS.iter().any(|h| generated.contains(h)) {
        ConversationState::AwaitingEmail
    } else {
        previous
    }
}

fn compile(pattern: &str) -> EngineResult<Regex> {
    Regex::new(pattern)
        .map_err(|e| EngineError::config(format!("invalid rule pattern {pattern:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn eval(text: &str, state: ConversationState) -> Option<RuleMatch> {
        let rules = RuleSet::standard().unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        rules.evaluate(text, state, &mut rng)
    }

    #[test]
    fn rule_order_is_fixed() {
        let rules = RuleSet::standard().unwrap();
        assert_eq!(
            rules.names(),
            vec![
                "greeting",
                "farewell",
                "email_capture",
                "order_lookup",
                "flight_cancellation",
                "account_intent"
            ]
        );
    }

    #[test]
    fn greeting_needs_word_boundary() {
        assert!(eval("Hi!", ConversationState::General).is_some());
        // "this" 里的 "hi" 不算问候
        assert!(eval("this is it", ConversationState::General).is_none());
        assert_eq!(
            eval("Good Morning team", ConversationState::HasEmail).unwrap().rule,
            "greeting"
        );
    }

    #[test]
    fn greeting_beats_farewell() {
        let matched = eval("hello and goodbye", ConversationState::AwaitingEmail).unwrap();
        assert_eq!(matched.rule, "greeting");
        assert_eq!(matched.reply.state, ConversationState::General);
    }

    #[test]
    fn farewell_overrides_pending_flow() {
        let matched = eval("ok, see you tomorrow", ConversationState::AwaitingOrderNumber).unwrap();
        assert_eq!(matched.rule, "farewell");
        assert_eq!(matched.reply.reply, FAREWELL_REPLY);
        assert_eq!(matched.reply.state, ConversationState::General);
    }

    #[test]
    fn flight_confirmation_ignores_case() {
        let prefix = "Your flight has been successfully cancelled. Your confirmation number is ";
        for text in ["YES please", "Yes"] {
            let matched = eval(text, ConversationState::AwaitingFlightInfo).unwrap();
            assert_eq!(matched.rule, "flight_cancellation");
            assert_eq!(matched.reply.state, ConversationState::HasEmail);
            assert!(matched.reply.reply.starts_with(prefix));
            let number: u32 = matched.reply.reply[prefix.len()..]
                .trim_end_matches('.')
                .parse()
                .unwrap();
            assert!((10000..=99999).contains(&number));
        }
    }

    #[test]
    fn farewell_ignores_case() {
        for (text, state) in [
            ("GOODBYE", ConversationState::AwaitingEmail),
            ("Bye!", ConversationState::AwaitingFlightInfo),
            ("See You later", ConversationState::AwaitingOrderNumber),
        ] {
            let matched = eval(text, state).unwrap();
            assert_eq!(matched.rule, "farewell");
            assert_eq!(matched.reply.reply, FAREWELL_REPLY);
            assert_eq!(matched.reply.state, ConversationState::General);
        }
    }

    #[test]
    fn general_state_without_keywords_falls_through() {
        assert!(eval("what are your opening times", ConversationState::General).is_none());
        assert!(eval("tell me something", ConversationState::HasEmail).is_none());
    }

    #[test]
    fn order_number_takes_first_long_digit_run() {
        let matched = eval("ref 1234, order 98765432 or 55555", ConversationState::AwaitingOrderNumber).unwrap();
        assert_eq!(matched.rule, "order_lookup");
        assert_eq!(
            matched.reply.reply,
            "Thank you. I've looked up order number 98765432 and it is currently out for delivery."
        );
        assert_eq!(matched.reply.state, ConversationState::HasEmail);
    }

    #[test]
    fn has_email_prefers_order_over_flight() {
        let matched = eval("cancel my order", ConversationState::HasEmail).unwrap();
        assert_eq!(matched.reply.state, ConversationState::AwaitingOrderNumber);
    }

    #[test]
    fn model_transition_only_from_general() {
        assert_eq!(
            model_transition(ConversationState::General, "please send us a dm"),
            ConversationState::AwaitingEmail
        );
        assert_eq!(
            model_transition(ConversationState::General, "we will look into it"),
            ConversationState::General
        );
        assert_eq!(
            model_transition(ConversationState::HasEmail, "what is your email"),
            ConversationState::HasEmail
        );
    }
}
