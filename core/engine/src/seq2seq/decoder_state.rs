use ndarray::Array2;

/// LSTM 的 (h, c) 状态对，形状均为 `[1, lstm_units]`
///
/// 每个 beam 候选持有自己的一份拷贝，分支之后互不共享。
#[derive(Debug, Clone, PartialEq)]
pub struct LstmState {
    pub h: Array2<f32>,
    pub c: Array2<f32>,
}

impl LstmState {
    pub fn new(h: Array2<f32>, c: Array2<f32>) -> Self {
        Self { h, c }
    }

    pub fn zeros(units: usize) -> Self {
        Self {
            h: Array2::zeros((1, units)),
            c: Array2::zeros((1, units)),
        }
    }

    pub fn units(&self) -> usize {
        self.h.shape()[1]
    }
}

/// Decoder 单步输出：下一个 token 的概率分布 + 新状态
#[derive(Debug, Clone)]
pub struct DecoderStep {
    pub probabilities: Vec<f32>,
    pub state: LstmState,
}
