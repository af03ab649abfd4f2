use thiserror::Error;

/// Unified error type for the mirror core.
///
/// Construction-time variants (`MalformedAddress` through `Build`) are fatal
/// at their call site and prevent a partially built tree from ever reaching
/// the connected state. `ResolutionMiss` and `Coercion` are recoverable in
/// steady state: the poller logs them per entry and moves on.
#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("malformed address: {0}")]
    MalformedAddress(String),

    #[error("ambiguous merge: {0}")]
    AmbiguousMerge(String),

    #[error("unknown field kind: {0}")]
    UnknownFieldKind(String),

    #[error("build failed: {0}")]
    Build(String),

    #[error("no control point for: {0}")]
    ResolutionMiss(String),

    #[error("coercion failed: {0}")]
    Coercion(String),

    #[error("write rejected: {0}")]
    WriteRejected(String),

    #[error("not connected")]
    NotConnected,

    #[error("device client: {0}")]
    Client(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, MirrorError>;

impl MirrorError {
    /// Whether the poller may skip this entry and carry on with the tick.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::MalformedAddress(_) | Self::ResolutionMiss(_) | Self::Coercion(_)
        )
    }
}
