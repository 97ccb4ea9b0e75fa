use anyhow::{anyhow, Result};
use ndarray::{Array2, CowArray, IxDyn};
use ort::tensor::OrtOwnedTensor;
use ort::Value;

use crate::error::{EngineError, EngineResult};
use super::decoder_state::{DecoderStep, LstmState};
use super::encoder::extract_state;
use super::lstm_onnx::LstmSeq2SeqOnnx;
use super::StepDecoder;

impl LstmSeq2SeqOnnx {
    /// 执行 decoder 的单次步进
    ///
    /// - 输入：token `[1, 1]`、h `[1, units]`、c `[1, units]`（严格按模型输入顺序）
    /// - 输出：(最后一个时间步的概率分布, 新的 (h, c))
    pub(crate) fn decoder_step(&self, prev_token_id: i64, state: &LstmState) -> Result<DecoderStep> {
        if let Some(units) = self.metadata.lstm_units {
            if state.units() != units {
                return Err(anyhow!(
                    "decoder state has {} units, model expects {}",
                    state.units(),
                    units
                ));
            }
        }

        let token: Array2<f32> = Array2::from_elem((1, 1), prev_token_id as f32);
        let token_cow = CowArray::from(token.into_dyn());
        let h_cow = CowArray::from(state.h.clone().into_dyn());
        let c_cow = CowArray::from(state.c.clone().into_dyn());

        let session = self.lock_decoder()?;
        let allocator = session.allocator();
        let token_value = Value::from_array(allocator, &token_cow)
            .map_err(|e| anyhow!("failed to convert decoder token to Value: {e}"))?;
        let h_value = Value::from_array(allocator, &h_cow)
            .map_err(|e| anyhow!("failed to convert state_h to Value: {e}"))?;
        let c_value = Value::from_array(allocator, &c_cow)
            .map_err(|e| anyhow!("failed to convert state_c to Value: {e}"))?;

        let outputs: Vec<Value> = session
            .run(vec![token_value, h_value, c_value])
            .map_err(|e| anyhow!("failed to run decoder model: {e}"))?;
        if outputs.len() != 3 {
            return Err(anyhow!("decoder returned {} outputs, expected 3", outputs.len()));
        }

        let probs: OrtOwnedTensor<f32, IxDyn> = outputs[0]
            .try_extract::<f32>()
            .map_err(|e| anyhow!("failed to extract decoder probabilities: {e}"))?;
        let view = probs.view();
        let vocab_size = view.shape().last().copied().unwrap_or(0);
        if vocab_size == 0 {
            return Err(anyhow!("decoder produced an empty distribution"));
        }
        let flat: Vec<f32> = view.iter().copied().collect();
        let probabilities = flat[flat.len() - vocab_size..].to_vec();

        let h = extract_state(&outputs[1], "decoder state_h")?;
        let c = extract_state(&outputs[2], "decoder state_c")?;

        Ok(DecoderStep {
            probabilities,
            state: LstmState::new(h, c),
        })
    }
}

impl StepDecoder for LstmSeq2SeqOnnx {
    fn step(&self, prev_token_id: i64, state: &LstmState) -> EngineResult<DecoderStep> {
        self.decoder_step(prev_token_id, state)
            .map_err(|e| EngineError::inference(format!("{e:#}")))
    }
}
