use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use ort::{Environment, Session, SessionBuilder};

use crate::error::{EngineError, EngineResult};

/// model_config.json：导出模型时一并写出的形状信息
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ModelMetadata {
    pub max_input_length: usize,
    pub max_response_length: usize,
    #[serde(default)]
    pub lstm_units: Option<usize>,
}

impl ModelMetadata {
    pub fn from_file(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            return Err(anyhow!("model_config.json not found at {}", config_path.display()));
        }
        let data = fs::read_to_string(config_path)
            .map_err(|e| anyhow!("failed to read {}: {e}", config_path.display()))?;
        let metadata: ModelMetadata = serde_json::from_str(&data)
            .map_err(|e| anyhow!("failed to parse {}: {e}", config_path.display()))?;
        if metadata.max_input_length == 0 {
            return Err(anyhow!("max_input_length must be positive"));
        }
        Ok(metadata)
    }
}

/// 训练好的 LSTM seq2seq 模型，拆成两个 ONNX 图：
/// - `encoder.onnx`：`[1, max_input_length]` -> (..., state_h, state_c)
/// - `decoder.onnx`：(`[1, 1]` token, h, c) -> (`[1, 1, vocab]` 概率, h, c)
///
/// 两个 session 各自有一把锁；加载之后权重只读。
pub struct LstmSeq2SeqOnnx {
    pub(crate) encoder_session: Mutex<Session>,
    pub(crate) decoder_session: Mutex<Session>,
    pub metadata: ModelMetadata,
    _environment: Arc<Environment>,
}

impl LstmSeq2SeqOnnx {
    /// 从模型目录加载 encoder.onnx、decoder.onnx 和 model_config.json
    ///
    /// 任何文件缺失或损坏都是启动期致命错误。
    pub fn new_from_dir(model_dir: &Path) -> EngineResult<Self> {
        Self::load(model_dir).map_err(|e| EngineError::artifact(format!("{e:#}")))
    }

    fn load(model_dir: &Path) -> Result<Self> {
        let metadata = ModelMetadata::from_file(&model_dir.join("model_config.json"))?;

        let environment = Arc::new(
            Environment::builder()
                .with_name("chat_seq2seq")
                .build()
                .map_err(|e| anyhow!("failed to create ONNX environment: {e}"))?,
        );

        let encoder_path = model_dir.join("encoder.onnx");
        let encoder_session = load_session(&environment, &encoder_path)?;
        tracing::info!(path = %encoder_path.display(), "encoder model loaded");

        let decoder_path = model_dir.join("decoder.onnx");
        let decoder_session = load_session(&environment, &decoder_path)?;
        tracing::info!(path = %decoder_path.display(), "decoder model loaded");

        for (i, input) in decoder_session.inputs.iter().enumerate() {
            tracing::debug!("decoder input[{i}] name={:?} dimensions={:?}", input.name, input.dimensions);
        }

        if encoder_session.outputs.len() < 2 {
            return Err(anyhow!(
                "encoder model has {} outputs, expected at least 2 (state_h, state_c)",
                encoder_session.outputs.len()
            ));
        }
        if let Some(input) = encoder_session.inputs.first() {
            if let Some(len) = input.dimensions.get(1).copied().flatten() {
                if len as usize != metadata.max_input_length {
                    return Err(anyhow!(
                        "encoder input length {} does not match max_input_length {}",
                        len,
                        metadata.max_input_length
                    ));
                }
            }
        }
        if decoder_session.inputs.len() != 3 || decoder_session.outputs.len() != 3 {
            return Err(anyhow!(
                "decoder model has {} inputs / {} outputs, expected 3 / 3 (token, h, c)",
                decoder_session.inputs.len(),
                decoder_session.outputs.len()
            ));
        }

        let mut metadata = metadata;
        if metadata.lstm_units.is_none() {
            metadata.lstm_units = decoder_session
                .inputs
                .get(1)
                .and_then(|input| input.dimensions.get(1).copied().flatten())
                .map(|units| units as usize);
        }

        tracing::info!(
            max_input_length = metadata.max_input_length,
            max_response_length = metadata.max_response_length,
            lstm_units = ?metadata.lstm_units,
            "seq2seq model ready"
        );

        Ok(Self {
            encoder_session: Mutex::new(encoder_session),
            decoder_session: Mutex::new(decoder_session),
            metadata,
            _environment: environment,
        })
    }

    pub(crate) fn lock_encoder(&self) -> Result<MutexGuard<'_, Session>> {
        self.encoder_session
            .lock()
            .map_err(|_| anyhow!("encoder session lock poisoned"))
    }

    pub(crate) fn lock_decoder(&self) -> Result<MutexGuard<'_, Session>> {
        self.decoder_session
            .lock()
            .map_err(|_| anyhow!("decoder session lock poisoned"))
    }
}

fn load_session(environment: &Arc<Environment>, model_path: &Path) -> Result<Session> {
    if !model_path.exists() {
        return Err(anyhow!("ONNX model not found at {}", model_path.display()));
    }
    SessionBuilder::new(environment)
        .map_err(|e| anyhow!("failed to create Session builder: {e}"))?
        .with_model_from_file(model_path)
        .map_err(|e| anyhow!("failed to load ONNX model from {}: {e}", model_path.display()))
}
