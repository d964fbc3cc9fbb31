use std::io;

use crate::bridge::ChannelError;
use crate::store::CollaboratorError;
use crate::translator::TranslationError;

/// Everything that can go wrong while a session is alive.
///
/// Only [`BridgeError::Translation`] leaves the session open; every other
/// variant ends it.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Translation(#[from] TranslationError),

    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),

    #[error("transport error: {0}")]
    Transport(#[source] io::Error),
}

impl BridgeError {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Translation(_))
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
