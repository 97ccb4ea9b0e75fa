use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rand::RngCore;
use uuid::Uuid;

use crate::config_manager::InferencePolicy;
use crate::conversation::{model_transition, RuleSet};
use crate::error::{EngineError, EngineResult};
use crate::seq2seq::{GeneratedReply, Seq2SeqPipeline};
use crate::turn_logger::{TurnLog, TurnLogger, HANDLED_BY_MODEL};
use crate::types::{ConversationState, TurnReply};

/// 轮次边界上出现内部错误时给用户的回复
pub const APOLOGY_REPLY: &str =
    "I'm sorry, something went wrong on my side. Could you please rephrase that?";

/// 对话引擎：规则优先，未命中时交给 seq2seq 模型
///
/// 模型和词表在构造时加载一次，之后只读；会话状态由调用方保存并逐轮传入。
#[derive(Clone)]
pub struct ChatEngine {
    pub(crate) rules: Arc<RuleSet>,
    pub(crate) pipeline: Arc<Seq2SeqPipeline>,
    pub(crate) policy: InferencePolicy,
    pub(crate) inference_gate: Arc<Mutex<()>>,
    pub(crate) turn_logger: Option<Arc<TurnLogger>>,
}

impl ChatEngine {
    pub fn policy(&self) -> InferencePolicy {
        self.policy
    }

    pub fn pipeline(&self) -> &Seq2SeqPipeline {
        &self.pipeline
    }

    /// 处理一轮对话，随机分支使用线程本地随机源
    pub fn respond(&self, input: &str, state: ConversationState) -> TurnReply {
        let mut rng = rand::thread_rng();
        self.respond_with_rng(input, state, &mut rng)
    }

    /// 以字符串标签收发状态；无法识别的标签按 `general` 处理
    pub fn respond_tagged(&self, input: &str, state_tag: &str) -> (String, String) {
        let reply = self.respond(input, ConversationState::parse_lenient(state_tag));
        (reply.reply, reply.state.as_str().to_string())
    }

    /// 处理一轮对话，随机源可注入（测试里固定种子）
    ///
    /// 永远返回一条回复：模型路径上的任何错误（包括 panic）都会被记录，
    /// 然后返回致歉回复并保持原状态不变。
    pub fn respond_with_rng(
        &self,
        input: &str,
        state: ConversationState,
        rng: &mut dyn RngCore,
    ) -> TurnReply {
        let turn_id = Uuid::new_v4().to_string();

        if let Some(matched) = self.rules.evaluate(input, state, rng) {
            tracing::debug!(rule = matched.rule, from = %state, to = %matched.reply.state, "rule matched");
            self.log_turn(TurnLog::new(
                turn_id,
                state,
                matched.reply.state,
                matched.rule,
                matched.reply.reply.len(),
                true,
            ));
            return matched.reply;
        }

        let started = Instant::now();
        let (reply, ok) = match self.generate_guarded(input) {
            Ok(generated) => {
                let next = model_transition(state, &generated.text);
                (TurnReply::new(generated.text, next), true)
            }
            Err(e) => {
                tracing::error!(turn_id = %turn_id, state = %state, error = %e, "model fallback failed");
                (TurnReply::new(APOLOGY_REPLY, state), false)
            }
        };
        let elapsed_ms = saturating_millis(started.elapsed());

        self.log_turn(
            TurnLog::new(
                turn_id,
                state,
                reply.state,
                HANDLED_BY_MODEL,
                reply.reply.len(),
                ok,
            )
            .with_generation_ms(elapsed_ms),
        );
        reply
    }

    /// 直接调用模型生成（不经过规则），遵守推理并发策略
    pub fn generate(&self, input: &str) -> EngineResult<GeneratedReply> {
        let _gate = match self.policy {
            InferencePolicy::Serialized => Some(
                self.inference_gate
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner()),
            ),
            InferencePolicy::Concurrent => None,
        };
        self.pipeline.generate(input)
    }

    fn generate_guarded(&self, input: &str) -> EngineResult<GeneratedReply> {
        match catch_unwind(AssertUnwindSafe(|| self.generate(input))) {
            Ok(result) => result,
            Err(panic) => {
                let detail = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Err(EngineError::inference(format!("model generation panicked: {detail}")))
            }
        }
    }

    fn log_turn(&self, log: TurnLog) {
        if let Some(logger) = &self.turn_logger {
            logger.log(&log);
        }
    }
}

/// 毫秒数超出 u64 时取 u64::MAX
fn saturating_millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_time_saturates_instead_of_wrapping() {
        assert_eq!(saturating_millis(Duration::from_millis(1_234)), 1_234);
        assert_eq!(saturating_millis(Duration::MAX), u64::MAX);
    }
}
