pub mod beam_search;
pub mod decoder;
pub mod decoder_state;
pub mod encoder;
pub mod lstm_onnx;
pub mod pipeline;
pub mod stub;
pub mod vocabulary;

use crate::error::EngineResult;

pub use beam_search::{BeamCandidate, BeamOutcome, BeamSearch, BeamSearchConfig};
pub use decoder_state::{DecoderStep, LstmState};
pub use lstm_onnx::{LstmSeq2SeqOnnx, ModelMetadata};
pub use pipeline::{GeneratedReply, Seq2SeqPipeline};
pub use stub::TableSeq2Seq;
pub use vocabulary::Vocabulary;

/// Encoder：padded 输入 -> 初始 (h, c)，每次生成请求只跑一次
pub trait SequenceEncoder: Send + Sync {
    fn encode_sequence(&self, padded_ids: &[i64]) -> EngineResult<LstmState>;
}

/// Decoder 单步：上一个 token + 状态 -> 词表上的概率分布 + 新状态
pub trait StepDecoder: Send + Sync {
    fn step(&self, prev_token_id: i64, state: &LstmState) -> EngineResult<DecoderStep>;
}
