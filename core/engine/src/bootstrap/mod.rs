pub mod builder;
pub mod core;

pub use builder::ChatEngineBuilder;
pub use self::core::{ChatEngine, APOLOGY_REPLY};
