use std::cmp::Ordering;

use crate::error::{EngineError, EngineResult};
use super::decoder_state::LstmState;
use super::StepDecoder;

pub const DEFAULT_BEAM_WIDTH: usize = 3;
pub const DEFAULT_MAX_RESPONSE_LENGTH: usize = 20;
/// 取对数前加上的 ε，防止 ln(0)
pub const LOG_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeamSearchConfig {
    pub beam_width: usize,
    pub max_response_length: usize,
}

impl Default for BeamSearchConfig {
    fn default() -> Self {
        Self {
            beam_width: DEFAULT_BEAM_WIDTH,
            max_response_length: DEFAULT_MAX_RESPONSE_LENGTH,
        }
    }
}

/// 一个候选序列：token 历史、累计负对数概率、自己的 decoder 状态
#[derive(Debug, Clone)]
pub struct BeamCandidate {
    pub tokens: Vec<i64>,
    pub score: f64,
    pub state: LstmState,
}

impl BeamCandidate {
    pub fn last_token(&self) -> Option<i64> {
        self.tokens.last().copied()
    }

    fn is_finished(&self, end_id: i64) -> bool {
        self.last_token() == Some(end_id)
    }
}

#[derive(Debug, Clone)]
pub struct BeamOutcome {
    /// 分数最低（联合概率最高）的候选，含起始的 `<start>`
    pub best: BeamCandidate,
    /// 实际执行的解码步数
    pub steps: usize,
    /// 最优候选是否以 `<end>` 结束（否则是被步数上限截断的）
    pub finished: bool,
    /// 结束时保留下来的全部候选 (tokens, score)，按分数升序
    pub survivors: Vec<(Vec<i64>, f64)>,
}

pub struct BeamSearch {
    config: BeamSearchConfig,
    start_id: i64,
    end_id: i64,
}

impl BeamSearch {
    pub fn new(config: BeamSearchConfig, start_id: i64, end_id: i64) -> EngineResult<Self> {
        if config.beam_width == 0 {
            return Err(EngineError::config("beam_width must be at least 1"));
        }
        Ok(Self {
            config,
            start_id,
            end_id,
        })
    }

    pub fn config(&self) -> BeamSearchConfig {
        self.config
    }

    /// 从 encoder 状态出发逐步驱动 decoder，返回分数最低的序列
    ///
    /// 已经以 `<end>` 结尾的候选原样进入下一轮，不再扩展；
    /// 所有保留候选都结束时提前停止。步数耗尽时直接取当前最优，不报错。
    pub fn search(
        &self,
        decoder: &dyn StepDecoder,
        initial_state: LstmState,
    ) -> EngineResult<BeamOutcome> {
        let width = self.config.beam_width;
        let mut beams = vec![BeamCandidate {
            tokens: vec![self.start_id],
            score: 0.0,
            state: initial_state,
        }];
        let mut steps = 0usize;

        for _ in 0..self.config.max_response_length {
            let mut pool: Vec<BeamCandidate> = Vec::with_capacity(width * beams.len());

            for beam in beams {
                if beam.is_finished(self.end_id) {
                    pool.push(beam);
                    continue;
                }

                let last = beam.last_token().unwrap_or(self.start_id);
                let step = decoder.step(last, &beam.state)?;
                if step.probabilities.is_empty() {
                    return Err(EngineError::inference("decoder produced an empty distribution"));
                }

                for (token, probability) in top_k(&step.probabilities, width) {
                    let mut tokens = Vec::with_capacity(beam.tokens.len() + 1);
                    tokens.extend_from_slice(&beam.tokens);
                    tokens.push(token as i64);
                    pool.push(BeamCandidate {
                        tokens,
                        score: beam.score - (probability as f64 + LOG_EPSILON).ln(),
                        state: step.state.clone(),
                    });
                }
            }

            pool.sort_by(|a, b| a.score.total_cmp(&b.score));
            pool.truncate(width);
            beams = pool;
            steps += 1;

            tracing::trace!(
                step = steps,
                best_score = beams[0].score,
                "beam step complete"
            );

            if beams.iter().all(|b| b.is_finished(self.end_id)) {
                break;
            }
        }

        let survivors = beams
            .iter()
            .map(|b| (b.tokens.clone(), b.score))
            .collect();
        let best = beams.swap_remove(0);
        let finished = best.is_finished(self.end_id);

        Ok(BeamOutcome {
            best,
            steps,
            finished,
            survivors,
        })
    }
}

/// 概率最高的 k 个 token id：概率降序，概率相同时 id 小的在前，NaN 排最后
pub(crate) fn top_k(probabilities: &[f32], k: usize) -> Vec<(usize, f32)> {
    let rank = |p: f32| if p.is_nan() { f32::NEG_INFINITY } else { p };
    let mut indices: Vec<usize> = (0..probabilities.len()).collect();
    indices.sort_by(|&a, &b| match rank(probabilities[b]).total_cmp(&rank(probabilities[a])) {
        Ordering::Equal => a.cmp(&b),
        other => other,
    });
    indices.truncate(k);
    indices.into_iter().map(|i| (i, probabilities[i])).collect()
}
