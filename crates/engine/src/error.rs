use std::error::Error as StdError;

/// Crate-wide result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Typed errors shared across the session, channel, and command components.
///
/// Everything here is a command-level condition: errors are reported back to
/// the session that triggered them (or logged) and are never process-fatal.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A channel name did not resolve to an existing channel.
    #[error("no channel named '{name}'")]
    ChannelNotFound { name: String },

    /// A display name did not resolve to a connected session.
    #[error("no connected user named '{name}'")]
    UserNotFound { name: String },

    /// An explicit creation request named a channel that already exists.
    #[error("channel '{name}' already exists")]
    ChannelExists { name: String },

    /// A transport handle was registered twice. Connection ids are freshly
    /// generated per connect, so this is a defensive check only.
    #[error("session '{conn_id}' is already registered")]
    DuplicateSession { conn_id: String },

    /// Malformed command arguments.
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    /// A channel store operation failed.
    #[error("persistence failure: {context}: {source}")]
    Persistence {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    /// A send or close on a connection failed.
    #[error("transport failure: {message}")]
    Transport { message: String },
}

impl Error {
    #[must_use]
    pub fn channel_not_found(name: impl Into<String>) -> Self {
        Self::ChannelNotFound { name: name.into() }
    }

    #[must_use]
    pub fn user_not_found(name: impl Into<String>) -> Self {
        Self::UserNotFound { name: name.into() }
    }

    #[must_use]
    pub fn channel_exists(name: impl Into<String>) -> Self {
        Self::ChannelExists { name: name.into() }
    }

    #[must_use]
    pub fn duplicate_session(conn_id: impl Into<String>) -> Self {
        Self::DuplicateSession {
            conn_id: conn_id.into(),
        }
    }

    #[must_use]
    pub fn invalid_input(message: impl std::fmt::Display) -> Self {
        Self::InvalidInput {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn persistence(
        context: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::Persistence {
            context: context.into(),
            source: Box::new(source),
        }
    }

    #[must_use]
    pub fn transport(message: impl std::fmt::Display) -> Self {
        Self::Transport {
            message: message.to_string(),
        }
    }
}
