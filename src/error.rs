use thiserror::Error;

use crate::mir::BlockId;

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Errors fall into two categories with very different handling contracts:
///
/// ## Internal-invariant violations
///
/// [`Error::InvariantViolation`] and [`Error::FixedPointDiverged`] indicate a malformed graph
/// or a broken analysis invariant. These are fatal for the current method: continuing would
/// silently corrupt value numbers for the rest of the method, so callers must never swallow
/// them and resume optimization.
///
/// ## Unsupported input shapes
///
/// [`Error::UnsupportedMethod`] indicates input this subsystem does not model (for example a
/// virtual register used inconsistently). It is recoverable at method granularity: the caller
/// marks the whole method for the unoptimized fallback path instead of crashing the compiler.
///
/// # Examples
///
/// ```rust
/// use miropt::{Error, mir::MethodBuilder};
///
/// let builder = MethodBuilder::new(2);
/// match builder.finish() {
///     Ok(method) => {
///         println!("method with {} blocks", method.block_count());
///     }
///     Err(Error::InvariantViolation { message, block }) => {
///         eprintln!("malformed graph at {block:?}: {message}");
///     }
///     Err(e) => {
///         eprintln!("other error: {e}");
///     }
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// A structural invariant of the method graph was violated.
    ///
    /// Raised for malformed CFGs (inconsistent predecessor/successor edges, missing entry or
    /// exit), for analysis ordering mistakes (dominance queried before DFS ordering), and for
    /// phi nodes whose operand count does not match the predecessor count. The offending block
    /// is identified when one exists.
    #[error("invariant violation at {block:?}: {message}")]
    InvariantViolation {
        /// Description of the violated invariant.
        message: String,
        /// The block on which the violation was detected, if any.
        block: Option<BlockId>,
    },

    /// The method uses input shapes this subsystem does not model.
    ///
    /// Recoverable at method granularity: the caller should mark the method for the
    /// unoptimized fallback path rather than treat this as a compiler failure.
    #[error("unsupported method: {message}")]
    UnsupportedMethod {
        /// Description of the unsupported shape.
        message: String,
    },

    /// A fixed-point loop failed to converge within the defensive iteration cap.
    ///
    /// Unreachable given the monotone-merge design; reported as a hard error rather than
    /// truncating early, since truncation would yield under-approximated, unsafe
    /// "already checked" facts.
    #[error("fixed point not reached after {passes} passes")]
    FixedPointDiverged {
        /// Number of full passes performed before giving up.
        passes: usize,
    },
}

impl Error {
    /// Convenience constructor for an invariant violation on a specific block.
    pub(crate) fn invariant(block: impl Into<Option<BlockId>>, message: impl Into<String>) -> Self {
        Self::InvariantViolation {
            message: message.into(),
            block: block.into(),
        }
    }

    /// Convenience constructor for an unsupported-method error.
    pub(crate) fn unsupported(message: impl Into<String>) -> Self {
        Self::UnsupportedMethod {
            message: message.into(),
        }
    }
}
