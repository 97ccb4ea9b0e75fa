use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

use crate::error::{EngineError, EngineResult};
use crate::seq2seq::beam_search::DEFAULT_BEAM_WIDTH;

pub const DEFAULT_CONFIG_FILE: &str = "chat_engine.toml";
pub const DEFAULT_PORT: u16 = 5000;

/// 推理并发策略
///
/// - `Serialized`：整个生成过程（encoder + beam search）串行执行
/// - `Concurrent`：不同请求可以交错执行，只在单次 ONNX 调用上加锁
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InferencePolicy {
    Concurrent,
    #[default]
    Serialized,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSection {
    /// 包含 encoder.onnx / decoder.onnx / vocab.json / model_config.json 的目录
    pub dir: PathBuf,
}

impl Default for ModelSection {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("saved_models"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    pub beam_width: usize,
    /// 覆盖 model_config.json 里的 max_response_length
    pub max_response_length: Option<usize>,
    pub inference_policy: InferencePolicy,
    /// 每轮输出一行 JSON 日志
    pub turn_log: bool,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            beam_width: DEFAULT_BEAM_WIDTH,
            max_response_length: None,
            inference_policy: InferencePolicy::default(),
            turn_log: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
        }
    }
}

/// 运行时配置（从 TOML 文件加载，所有字段都有默认值）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub model: ModelSection,
    pub engine: EngineSection,
    pub server: ServerSection,
}

impl EngineConfig {
    pub fn from_toml_str(content: &str) -> EngineResult<Self> {
        let config: EngineConfig = toml::from_str(content)
            .map_err(|e| EngineError::config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> EngineResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            EngineError::config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// 文件不存在时使用默认配置；文件存在但无法解析仍然报错
    pub fn load_or_default(path: &Path) -> EngineResult<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            tracing::info!(path = %path.display(), "config file not found, using defaults");
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.engine.beam_width == 0 {
            return Err(EngineError::config("engine.beam_width must be at least 1"));
        }
        Ok(())
    }

    /// `PORT` 环境变量优先于配置文件
    pub fn effective_port(&self) -> u16 {
        resolve_port(std::env::var("PORT").ok().as_deref(), self.server.port)
    }
}

pub(crate) fn resolve_port(env_value: Option<&str>, configured: u16) -> u16 {
    env_value
        .and_then(|v| v.trim().parse::<u16>().ok())
        .unwrap_or(configured)
}

/// 命令行里的 `--config <path>`，没有则用默认文件名
pub fn config_path_from_args(args: &[String]) -> PathBuf {
    args.iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
}

#[async_trait]
pub trait ConfigManager: Send + Sync {
    async fn load(&self) -> EngineResult<EngineConfig>;
    async fn current(&self) -> EngineResult<EngineConfig>;
}

/// 基于 TOML 文件的 ConfigManager；`current()` 返回最近一次 `load()` 的结果
pub struct TomlConfigManager {
    path: PathBuf,
    allow_missing: bool,
    cached: RwLock<Option<EngineConfig>>,
}

impl TomlConfigManager {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            allow_missing: false,
            cached: RwLock::new(None),
        }
    }

    pub fn allow_missing(mut self, allow: bool) -> Self {
        self.allow_missing = allow;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ConfigManager for TomlConfigManager {
    async fn load(&self) -> EngineResult<EngineConfig> {
        let config = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => EngineConfig::from_toml_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && self.allow_missing => {
                EngineConfig::default()
            }
            Err(e) => {
                return Err(EngineError::config(format!(
                    "Failed to read config file {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };
        *self.cached.write().await = Some(config.clone());
        Ok(config)
    }

    async fn current(&self) -> EngineResult<EngineConfig> {
        if let Some(config) = self.cached.read().await.clone() {
            return Ok(config);
        }
        self.load().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_gives_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.engine.beam_width, 3);
        assert_eq!(config.engine.inference_policy, InferencePolicy::Serialized);
        assert_eq!(config.server.port, 5000);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            [engine]
            beam_width = 5
            inference_policy = "concurrent"
            "#,
        )
        .unwrap();
        assert_eq!(config.engine.beam_width, 5);
        assert_eq!(config.engine.inference_policy, InferencePolicy::Concurrent);
        assert!(config.engine.turn_log);
        assert_eq!(config.model.dir, PathBuf::from("saved_models"));
    }

    #[test]
    fn zero_beam_width_is_rejected() {
        let err = EngineConfig::from_toml_str("[engine]\nbeam_width = 0\n").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Config);
    }

    #[test]
    fn port_env_overrides_config() {
        assert_eq!(resolve_port(Some("8080"), 5000), 8080);
        assert_eq!(resolve_port(Some("not-a-port"), 5000), 5000);
        assert_eq!(resolve_port(None, 5001), 5001);
    }

    #[test]
    fn config_flag_is_parsed() {
        let args: Vec<String> = ["chat_server", "--config", "custom.toml"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(config_path_from_args(&args), PathBuf::from("custom.toml"));
        assert_eq!(config_path_from_args(&args[..1]), PathBuf::from(DEFAULT_CONFIG_FILE));
    }
}
