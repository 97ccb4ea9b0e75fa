use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::config_manager::{EngineConfig, InferencePolicy};
use crate::conversation::RuleSet;
use crate::error::{EngineError, EngineResult};
use crate::seq2seq::beam_search::{BeamSearchConfig, DEFAULT_BEAM_WIDTH, DEFAULT_MAX_RESPONSE_LENGTH};
use crate::seq2seq::{LstmSeq2SeqOnnx, Seq2SeqPipeline, SequenceEncoder, StepDecoder, Vocabulary};
use crate::turn_logger::TurnLogger;

use super::core::ChatEngine;

pub struct ChatEngineBuilder {
    encoder: Option<Arc<dyn SequenceEncoder>>,
    decoder: Option<Arc<dyn StepDecoder>>,
    vocabulary: Option<Arc<Vocabulary>>,
    rules: Option<RuleSet>,
    max_input_length: Option<usize>,
    max_response_length: Option<usize>,
    beam_width: usize,
    policy: InferencePolicy,
    turn_logger: Option<Arc<TurnLogger>>,
}

impl Default for ChatEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatEngineBuilder {
    pub fn new() -> Self {
        Self {
            encoder: None,
            decoder: None,
            vocabulary: None,
            rules: None,
            max_input_length: None,
            max_response_length: None,
            beam_width: DEFAULT_BEAM_WIDTH,
            policy: InferencePolicy::default(),
            turn_logger: None,
        }
    }

    pub fn encoder(mut self, encoder: Arc<dyn SequenceEncoder>) -> Self {
        self.encoder = Some(encoder);
        self
    }

    pub fn decoder(mut self, decoder: Arc<dyn StepDecoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    /// 同一个对象同时充当 encoder 和 decoder（共享同一份权重）
    pub fn model<M>(self, model: Arc<M>) -> Self
    where
        M: SequenceEncoder + StepDecoder + 'static,
    {
        let encoder: Arc<dyn SequenceEncoder> = model.clone();
        let decoder: Arc<dyn StepDecoder> = model;
        self.encoder(encoder).decoder(decoder)
    }

    pub fn vocabulary(mut self, vocabulary: Arc<Vocabulary>) -> Self {
        self.vocabulary = Some(vocabulary);
        self
    }

    pub fn rules(mut self, rules: RuleSet) -> Self {
        self.rules = Some(rules);
        self
    }

    pub fn max_input_length(mut self, length: usize) -> Self {
        self.max_input_length = Some(length);
        self
    }

    pub fn max_response_length(mut self, length: usize) -> Self {
        self.max_response_length = Some(length);
        self
    }

    pub fn beam_width(mut self, width: usize) -> Self {
        self.beam_width = width;
        self
    }

    pub fn inference_policy(mut self, policy: InferencePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn turn_logger(mut self, logger: Arc<TurnLogger>) -> Self {
        self.turn_logger = Some(logger);
        self
    }

    /// 从模型目录加载 ONNX 模型和词表
    ///
    /// # Files Required
    /// - `encoder.onnx` / `decoder.onnx`
    /// - `vocab.json`
    /// - `model_config.json`
    pub fn with_onnx_model_dir(self, model_dir: &Path) -> EngineResult<Self> {
        if !model_dir.is_dir() {
            return Err(EngineError::artifact(format!(
                "model directory not found: {}",
                model_dir.display()
            )));
        }
        let vocabulary = Vocabulary::from_file(&model_dir.join("vocab.json"))?;
        let model = LstmSeq2SeqOnnx::new_from_dir(model_dir)?;
        let max_input_length = model.metadata.max_input_length;
        let max_response_length = model.metadata.max_response_length;

        tracing::info!(
            dir = %model_dir.display(),
            vocab_size = vocabulary.len(),
            "model artifacts loaded"
        );

        let mut builder = self
            .model(Arc::new(model))
            .vocabulary(Arc::new(vocabulary))
            .max_input_length(max_input_length);
        if builder.max_response_length.is_none() {
            builder.max_response_length = Some(max_response_length);
        }
        Ok(builder)
    }

    /// 按配置文件组装：beam 参数、并发策略、轮次日志，再加载模型目录
    pub fn from_config(config: &EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        let mut builder = Self::new()
            .beam_width(config.engine.beam_width)
            .inference_policy(config.engine.inference_policy)
            .turn_logger(Arc::new(TurnLogger::new(config.engine.turn_log)));
        if let Some(length) = config.engine.max_response_length {
            builder = builder.max_response_length(length);
        }
        builder.with_onnx_model_dir(&config.model.dir)
    }

    pub fn build(self) -> EngineResult<ChatEngine> {
        let encoder = self
            .encoder
            .ok_or_else(|| EngineError::config("ChatEngineBuilder: encoder is required"))?;
        let decoder = self
            .decoder
            .ok_or_else(|| EngineError::config("ChatEngineBuilder: decoder is required"))?;
        let vocabulary = self
            .vocabulary
            .ok_or_else(|| EngineError::config("ChatEngineBuilder: vocabulary is required"))?;
        let max_input_length = self
            .max_input_length
            .ok_or_else(|| EngineError::config("ChatEngineBuilder: max_input_length is required"))?;
        let rules = match self.rules {
            Some(rules) => rules,
            None => RuleSet::standard()?,
        };

        let beam_config = BeamSearchConfig {
            beam_width: self.beam_width,
            max_response_length: self.max_response_length.unwrap_or(DEFAULT_MAX_RESPONSE_LENGTH),
        };
        let pipeline = Seq2SeqPipeline::new(encoder, decoder, vocabulary, max_input_length, beam_config)?;

        Ok(ChatEngine {
            rules: Arc::new(rules),
            pipeline: Arc::new(pipeline),
            policy: self.policy,
            inference_gate: Arc::new(Mutex::new(())),
            turn_logger: self.turn_logger,
        })
    }
}
