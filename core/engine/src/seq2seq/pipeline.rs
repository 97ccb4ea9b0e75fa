use std::sync::Arc;

use crate::error::{EngineError, EngineResult};
use super::beam_search::{BeamSearch, BeamSearchConfig};
use super::vocabulary::Vocabulary;
use super::{SequenceEncoder, StepDecoder};

/// 模型生成的回复
#[derive(Debug, Clone)]
pub struct GeneratedReply {
    pub text: String,
    pub tokens: Vec<i64>,
    pub score: f64,
    pub steps: usize,
    pub finished: bool,
}

/// 只读的推理上下文：分词 -> padding -> encoder -> beam search -> 反分词
///
/// 启动时构造一次，之后在所有请求间共享，不会被修改。
pub struct Seq2SeqPipeline {
    encoder: Arc<dyn SequenceEncoder>,
    decoder: Arc<dyn StepDecoder>,
    vocabulary: Arc<Vocabulary>,
    max_input_length: usize,
    beam: BeamSearch,
}

impl Seq2SeqPipeline {
    pub fn new(
        encoder: Arc<dyn SequenceEncoder>,
        decoder: Arc<dyn StepDecoder>,
        vocabulary: Arc<Vocabulary>,
        max_input_length: usize,
        beam_config: BeamSearchConfig,
    ) -> EngineResult<Self> {
        if max_input_length == 0 {
            return Err(EngineError::config("max_input_length must be positive"));
        }
        let beam = BeamSearch::new(beam_config, vocabulary.start_id, vocabulary.end_id)?;
        Ok(Self {
            encoder,
            decoder,
            vocabulary,
            max_input_length,
            beam,
        })
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    pub fn max_input_length(&self) -> usize {
        self.max_input_length
    }

    pub fn beam_config(&self) -> BeamSearchConfig {
        self.beam.config()
    }

    pub fn generate(&self, text: &str) -> EngineResult<GeneratedReply> {
        let padded = self.vocabulary.encode_padded(text, self.max_input_length);
        let initial_state = self.encoder.encode_sequence(&padded)?;
        let outcome = self.beam.search(self.decoder.as_ref(), initial_state)?;
        let reply = self.vocabulary.detokenize(&outcome.best.tokens);

        tracing::debug!(
            steps = outcome.steps,
            finished = outcome.finished,
            score = outcome.best.score,
            reply = %reply,
            "seq2seq generation finished"
        );

        Ok(GeneratedReply {
            text: reply,
            tokens: outcome.best.tokens,
            score: outcome.best.score,
            steps: outcome.steps,
            finished: outcome.finished,
        })
    }
}
