//! 每轮对话的结构化日志
//!
//! 记录状态转移、命中的规则（或模型）以及生成耗时，一轮一行 JSON。

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::types::ConversationState;

pub const TURN_LOG_TARGET: &str = "chat_turn";
/// 模型兜底时 `handled_by` 的取值
pub const HANDLED_BY_MODEL: &str = "model";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnLog {
    /// 时间戳（ISO 8601，UTC）
    pub ts: String,
    pub id: String,
    pub state_before: ConversationState,
    pub state_after: ConversationState,
    /// 命中的规则名，或 "model"
    pub handled_by: String,
    /// 模型生成耗时（毫秒），规则命中时为 None
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_ms: Option<u64>,
    pub reply_len: usize,
    pub ok: bool,
}

impl TurnLog {
    pub fn new(
        id: String,
        state_before: ConversationState,
        state_after: ConversationState,
        handled_by: &str,
        reply_len: usize,
        ok: bool,
    ) -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            ts: format_iso8601(secs),
            id,
            state_before,
            state_after,
            handled_by: handled_by.to_string(),
            generation_ms: None,
            reply_len,
            ok,
        }
    }

    pub fn with_generation_ms(mut self, ms: u64) -> Self {
        self.generation_ms = Some(ms);
        self
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// 格式化 Unix 时间戳为 ISO 8601（UTC，不处理闰秒）
pub(crate) fn format_iso8601(secs: u64) -> String {
    let days = secs / 86400;
    let secs_in_day = secs % 86400;

    let mut year = 1970u64;
    let mut day_of_year = days;
    loop {
        let days_in_year = if is_leap(year) { 366 } else { 365 };
        if day_of_year < days_in_year {
            break;
        }
        day_of_year -= days_in_year;
        year += 1;
    }

    let month_days = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];
    let mut month = 1;
    let mut day = day_of_year + 1;
    for (i, &days_in_month) in month_days.iter().enumerate() {
        let days_in_month = if i == 1 && is_leap(year) { days_in_month + 1 } else { days_in_month };
        if day <= days_in_month {
            break;
        }
        day -= days_in_month;
        month += 1;
    }

    let hour = secs_in_day / 3600;
    let minute = (secs_in_day % 3600) / 60;
    let second = secs_in_day % 60;

    format!("{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z", year, month, day, hour, minute, second)
}

fn is_leap(year: u64) -> bool {
    year % 4 == 0 && (year % 100 != 0 || year % 400 == 0)
}

pub struct TurnLogger {
    enabled: bool,
}

impl TurnLogger {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn log(&self, log: &TurnLog) {
        if !self.enabled {
            return;
        }
        if log.ok {
            tracing::info!(target: TURN_LOG_TARGET, "{}", log.to_json());
        } else {
            tracing::warn!(target: TURN_LOG_TARGET, "{}", log.to_json());
        }
    }
}

impl Default for TurnLogger {
    fn default() -> Self {
        Self { enabled: true }
    }
}
