//! 会话状态机：按优先级排列的意图规则，以及模型兜底后的状态转移

pub mod rules;

pub use rules::{
    model_transition, AccountIntentRule, EmailCaptureRule, FarewellRule, FlightCancellationRule,
    GreetingRule, OrderLookupRule, RuleMatch, RuleSet, TurnInput, TurnRule, GREETING_REPLIES,
};
