use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{EngineError, EngineResult};
use super::decoder_state::{DecoderStep, LstmState};
use super::vocabulary::PAD_ID;
use super::{SequenceEncoder, StepDecoder};

/// 查表式的 seq2seq stub（用于测试和没有模型文件时的联调）
///
/// - encoder：h[0][0] = 非 pad token 的个数，其余为 0
/// - decoder：下一个 token 的分布只由上一个 token 决定；每走一步 h[0][0] 加 1，
///   这样可以从最终状态看出 decoder 状态确实沿着候选路径传递
pub struct TableSeq2Seq {
    vocab_size: usize,
    units: usize,
    end_id: i64,
    transitions: HashMap<i64, Vec<f32>>,
    fallback: Option<Vec<f32>>,
    fail_on_step: bool,
    step_calls: AtomicUsize,
    encode_calls: AtomicUsize,
}

impl TableSeq2Seq {
    pub fn new(vocab_size: usize, end_id: i64) -> Self {
        Self {
            vocab_size,
            units: 4,
            end_id,
            transitions: HashMap::new(),
            fallback: None,
            fail_on_step: false,
            step_calls: AtomicUsize::new(0),
            encode_calls: AtomicUsize::new(0),
        }
    }

    /// 设置 `prev` 之后的分布；没列出的 id 概率为 0
    pub fn with_transition(mut self, prev: i64, next: &[(i64, f32)]) -> Self {
        let distribution = self.distribution(next);
        self.transitions.insert(prev, distribution);
        self
    }

    /// 没有配置转移的 token 使用的分布（默认是 `<end>` 概率 1）
    pub fn with_fallback(mut self, next: &[(i64, f32)]) -> Self {
        self.fallback = Some(self.distribution(next));
        self
    }

    /// 每次 decoder 调用都返回推理错误
    pub fn failing(mut self) -> Self {
        self.fail_on_step = true;
        self
    }

    pub fn step_calls(&self) -> usize {
        self.step_calls.load(Ordering::SeqCst)
    }

    pub fn encode_calls(&self) -> usize {
        self.encode_calls.load(Ordering::SeqCst)
    }

    fn distribution(&self, next: &[(i64, f32)]) -> Vec<f32> {
        let mut probabilities = vec![0.0; self.vocab_size];
        for &(id, p) in next {
            if let Some(slot) = usize::try_from(id).ok().and_then(|i| probabilities.get_mut(i)) {
                *slot = p;
            }
        }
        probabilities
    }
}

impl SequenceEncoder for TableSeq2Seq {
    fn encode_sequence(&self, padded_ids: &[i64]) -> EngineResult<LstmState> {
        self.encode_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = LstmState::zeros(self.units);
        state.h[[0, 0]] = padded_ids.iter().filter(|&&id| id != PAD_ID).count() as f32;
        Ok(state)
    }
}

impl StepDecoder for TableSeq2Seq {
    fn step(&self, prev_token_id: i64, state: &LstmState) -> EngineResult<DecoderStep> {
        self.step_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_on_step {
            return Err(EngineError::inference("decoder stub configured to fail"));
        }

        let probabilities = match self.transitions.get(&prev_token_id) {
            Some(distribution) => distribution.clone(),
            None => match &self.fallback {
                Some(distribution) => distribution.clone(),
                None => self.distribution(&[(self.end_id, 1.0)]),
            },
        };

        let mut next_state = state.clone();
        next_state.h[[0, 0]] += 1.0;
        Ok(DecoderStep {
            probabilities,
            state: next_state,
        })
    }
}
