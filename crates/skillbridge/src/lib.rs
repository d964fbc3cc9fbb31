//! skillbridge: relays an optimizer's socket requests to a SKILL simulator
//! running this process over its stdin/stdout pipes.

pub mod bridge;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod logging;
pub mod session;
pub mod store;
pub mod translator;

pub use config::{BridgeConfig, ConfigError, ConfigOverrides};
pub use error::BridgeError;
pub use session::{BRIDGE_EXIT_CODE, Bridge, CloseReason, SessionReport, SessionState};
pub use store::{CollaboratorError, JsonFileStore, VariableStore};
pub use translator::{Command, FileLayout, RequestSeq, TranslationError, Translator};
