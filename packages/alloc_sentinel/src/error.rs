use thiserror::Error;

/// Errors that can occur when acquiring memory or validating pointers.
///
/// All variants are recoverable by design: fault-injection exists precisely so that callers can
/// exercise their handling of these failures. Bookkeeping corruption (duplicate registrations,
/// damaged record tags, accounting underflow) is never reported through this type - those
/// conditions are fatal and abort via panic instead.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The underlying allocator refused the request, or the fault-injection state machine
    /// simulated such a refusal. The two cases are deliberately indistinguishable so that
    /// callers exercise the same recovery path either way.
    #[error("memory exhausted while acquiring {requested} bytes")]
    ExhaustedMemory {
        /// Number of bytes the caller asked for.
        requested: usize,
    },

    /// A typed acquisition would overflow the address-space size type.
    #[error("invalid allocation size: {count} elements of {element_size} bytes overflows usize")]
    InvalidSize {
        /// Number of elements requested.
        count: usize,

        /// Size of each element in bytes.
        element_size: usize,
    },

    /// The pointer handed to [`validate()`][crate::MemoryTracker::validate] is not currently
    /// registered in the tracking table.
    #[error("foreign pointer {address:#x} was not issued by this tracker")]
    ForeignPointer {
        /// Address of the unrecognized pointer.
        address: usize,
    },
}

/// A specialized `Result` type for tracker operations, returning the crate's
/// [`Error`] type as the error value.
pub type Result<T> = std::result::Result<T, Error>;
