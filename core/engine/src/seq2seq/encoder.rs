use anyhow::{anyhow, Result};
use ndarray::{Array2, CowArray, IxDyn};
use ort::tensor::OrtOwnedTensor;
use ort::Value;

use crate::error::{EngineError, EngineResult};
use super::decoder_state::LstmState;
use super::lstm_onnx::LstmSeq2SeqOnnx;
use super::SequenceEncoder;

impl LstmSeq2SeqOnnx {
    /// 运行 encoder，返回最后一步的 (state_h, state_c)
    ///
    /// Keras 导出的图以 float 接收 token id，这里按 `[1, max_input_length]` 组装输入。
    pub(crate) fn run_encoder(&self, padded_ids: &[i64]) -> Result<LstmState> {
        let seq_len = self.metadata.max_input_length;
        if padded_ids.len() != seq_len {
            return Err(anyhow!(
                "encoder expects {} ids, got {}",
                seq_len,
                padded_ids.len()
            ));
        }

        let input: Array2<f32> = Array2::from_shape_vec(
            (1, seq_len),
            padded_ids.iter().map(|&id| id as f32).collect(),
        )?;
        let input_cow = CowArray::from(input.into_dyn());

        let session = self.lock_encoder()?;
        let input_value = Value::from_array(session.allocator(), &input_cow)
            .map_err(|e| anyhow!("failed to convert encoder input to Value: {e}"))?;
        let outputs: Vec<Value> = session
            .run(vec![input_value])
            .map_err(|e| anyhow!("failed to run encoder model: {e}"))?;

        // 图的输出是 (encoder_outputs?, state_h, state_c)，状态总在最后两个
        let n = outputs.len();
        if n < 2 {
            return Err(anyhow!("encoder returned {n} outputs, expected state_h and state_c"));
        }
        let h = extract_state(&outputs[n - 2], "state_h")?;
        let c = extract_state(&outputs[n - 1], "state_c")?;
        Ok(LstmState::new(h, c))
    }
}

impl SequenceEncoder for LstmSeq2SeqOnnx {
    fn encode_sequence(&self, padded_ids: &[i64]) -> EngineResult<LstmState> {
        self.run_encoder(padded_ids)
            .map_err(|e| EngineError::inference(format!("{e:#}")))
    }
}

/// 把任意形状的状态张量压成 `[1, units]`
pub(crate) fn extract_state(value: &Value, name: &str) -> Result<Array2<f32>> {
    let tensor: OrtOwnedTensor<f32, IxDyn> = value
        .try_extract::<f32>()
        .map_err(|e| anyhow!("failed to extract {name}: {e}"))?;
    let owned = tensor.view().to_owned();
    let units = owned.len();
    owned
        .into_shape((1, units))
        .map_err(|e| anyhow!("failed to reshape {name} to [1, {units}]: {e}"))
}
