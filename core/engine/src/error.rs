use std::borrow::Cow;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// 错误类别
///
/// - `Artifact`：模型 / 词表文件缺失或损坏，只会在启动阶段出现，出现即不能对外服务
/// - `Config`：配置非法（例如 beam_width = 0）
/// - `Inference`：推理过程中的数值后端错误、张量形状不匹配、锁中毒等
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Artifact,
    Config,
    Inference,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Artifact => "artifact",
            ErrorKind::Config => "config",
            ErrorKind::Inference => "inference",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone)]
pub struct EngineError {
    kind: ErrorKind,
    message: Cow<'static, str>,
}

impl EngineError {
    pub fn new<T>(kind: ErrorKind, message: T) -> Self
    where
        T: Into<Cow<'static, str>>,
    {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn artifact<T>(message: T) -> Self
    where
        T: Into<Cow<'static, str>>,
    {
        Self::new(ErrorKind::Artifact, message)
    }

    pub fn config<T>(message: T) -> Self
    where
        T: Into<Cow<'static, str>>,
    {
        Self::new(ErrorKind::Config, message)
    }

    pub fn inference<T>(message: T) -> Self
    where
        T: Into<Cow<'static, str>>,
    {
        Self::new(ErrorKind::Inference, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for EngineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

impl Error for EngineError {}

pub type EngineResult<T> = Result<T, EngineError>;
