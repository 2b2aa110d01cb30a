//! Error types for amqpsnoop

use thiserror::Error;

use crate::expr::ExprError;

/// Fatal startup errors. Anything here terminates the process; per-message
/// evaluation faults are handled inside the filter chain and never reach
/// this type.
#[derive(Error, Debug)]
pub enum SnoopError {
    /// A `-f` expression failed to compile
    #[error("invalid filter expression {source_text:?}: {err}")]
    Filter {
        source_text: String,
        #[source]
        err: ExprError,
    },

    /// Unrecognized `-o` format name
    #[error("unknown output format: {0}")]
    UnknownFormat(String),

    /// Transport-level failure (connect, declare, bind, consume)
    #[error("broker error: {0}")]
    Broker(#[from] lapin::Error),

    /// The delivery stream ended without a signal from our side; the
    /// connection or channel is gone
    #[error("consumer stream ended unexpectedly")]
    ConsumerEnded,

    /// Output write failure (e.g. stdout is a closed pipe)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for snoop operations
pub type Result<T> = std::result::Result<T, SnoopError>;
