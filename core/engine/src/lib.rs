pub mod bootstrap;
pub mod config_manager;
pub mod conversation;
pub mod error;
pub mod seq2seq;
pub mod session;
pub mod turn_logger;
pub mod types;

pub use bootstrap::{ChatEngine, ChatEngineBuilder, APOLOGY_REPLY};
pub use config_manager::{ConfigManager, EngineConfig, InferencePolicy, TomlConfigManager};
pub use conversation::{model_transition, RuleMatch, RuleSet, TurnRule};
pub use error::{EngineError, EngineResult, ErrorKind};
pub use seq2seq::{
    BeamOutcome, BeamSearch, BeamSearchConfig, GeneratedReply, LstmSeq2SeqOnnx, LstmState,
    Seq2SeqPipeline, SequenceEncoder, StepDecoder, TableSeq2Seq, Vocabulary,
};
pub use session::SessionStore;
pub use turn_logger::{TurnLog, TurnLogger};
pub use types::{ConversationState, TurnReply};
