//! Error surface of the shielded client.
//!
//! Module internals propagate `anyhow` errors; everything crossing the public
//! API collapses into `ClientError`, one variant per failure kind, with
//! backend detail carried as an opaque payload. All kinds are recoverable:
//! the client never partially mutates local state on failure.

/// Which public operation an error or state tag refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Operation {
    Initialize,
    Shield,
    Transfer,
    Unshield,
    Scan,
    Sync,
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// An operation was invoked before `initialize(seed)` completed.
    #[error("client is not initialized")]
    NotInitialized,

    /// A re-entrant operation arrived while another is in flight.
    #[error("client is busy with a {0:?} operation")]
    Busy(Operation),

    /// A ZK address failed to decode.
    #[error("invalid shielded address: {0}")]
    InvalidAddress(String),

    /// The seed is too short or failed the KDF precondition.
    #[error("invalid seed: {0}")]
    InvalidSeed(String),

    /// Coin selection cannot cover the amount under the two-input cap.
    ///
    /// `selectable` is what the two largest notes add up to; the wallet's
    /// total balance may well be larger. Callers should surface this and
    /// schedule a consolidation transfer.
    #[error("insufficient balance: {required} requested, {selectable} selectable under the two-input limit")]
    InsufficientBalance { required: u64, selectable: u64 },

    /// The commitment tree reached its 2^20 capacity.
    #[error("commitment tree is full")]
    TreeFull,

    /// The prover could not produce a proof: inconsistent witness, missing
    /// artifacts, a timeout, or a backend crash.
    #[error("proof generation failed")]
    ProofFailed(#[source] anyhow::Error),

    /// The host chain rejected the instruction; the backend code is passed
    /// through verbatim.
    #[error("submission rejected: {0}")]
    SubmissionRejected(String),

    /// A decrypted note's recomputed commitment did not match the on-chain
    /// leaf it arrived with. Scanning discards the note and warns.
    #[error("decrypted note does not match on-chain leaf {leaf_index}")]
    ScanCorruption { leaf_index: u64 },
}
