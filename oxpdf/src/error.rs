//! Error kinds shared across the library.
//!
//! Construction-time failures (file discovery, parsing, metadata) are fatal
//! to the caller; hot-path failures (`UnphysicalX`, `OutOfGridRange`, ...)
//! are returned as values and never logged from library code.

use thiserror::Error;

/// Errors produced by PDF construction, evaluation, and set-level statistics.
#[derive(Debug, Error)]
pub enum Error {
    /// A data file could not be located on the search path.
    #[error("data file not found: {path}")]
    FileNotFound {
        /// The path or set-relative name that was searched for.
        path: String,
    },
    /// A data file existed but could not be read or parsed.
    #[error("failed to read {path}: {reason}")]
    ReadFailure {
        /// The offending file.
        path: String,
        /// What went wrong while reading it.
        reason: String,
    },
    /// An output file or directory could not be created or written.
    #[error("failed to write {path}: {reason}")]
    WriteFailure {
        /// The offending path.
        path: String,
        /// What went wrong while writing it.
        reason: String,
    },
    /// A required metadata key is missing at every cascade level.
    #[error("metadata key `{key}` not found")]
    MetadataMissing {
        /// The requested key.
        key: String,
    },
    /// A metadata value could not be converted to the requested type.
    #[error("metadata key `{key}` does not hold a valid {expected}")]
    MetadataBadType {
        /// The requested key.
        key: String,
        /// Name of the expected type.
        expected: &'static str,
    },
    /// A factory was asked for an implementation it does not know.
    #[error("unknown {what} requested: {name}")]
    FactoryUnknown {
        /// The kind of object requested (interpolator, extrapolator, ...).
        what: &'static str,
        /// The unrecognised name.
        name: String,
    },
    /// A momentum fraction outside [0, 1].
    #[error("unphysical x given: {value}")]
    UnphysicalX {
        /// The offending x value.
        value: f64,
    },
    /// A negative squared energy scale.
    #[error("unphysical Q2 given: {value}")]
    UnphysicalQ2 {
        /// The offending Q2 value.
        value: f64,
    },
    /// A lookup outside the knot range of a grid axis.
    #[error("{axis} value {value} outside grid range [{lo}, {hi}]")]
    OutOfGridRange {
        /// Which axis was queried.
        axis: &'static str,
        /// The queried value.
        value: f64,
        /// Lowest knot of the axis.
        lo: f64,
        /// Highest knot of the axis.
        hi: f64,
    },
    /// A parton id not carried by this PDF, in strict mode.
    #[error("unsupported flavor requested: {id}")]
    FlavorNotSupported {
        /// The PDG id.
        id: i32,
    },
    /// The configured extrapolator refuses off-grid queries.
    #[error("extrapolation disabled for this PDF")]
    ExtrapolationDisabled,
    /// The analytic coupling was queried at or below its Landau pole.
    #[error("alpha_s runaway: Q2 = {q2} is at or below Lambda^2 = {lambda2}")]
    AlphaSRunaway {
        /// The queried scale.
        q2: f64,
        /// The squared Lambda_QCD for the active flavour count.
        lambda2: f64,
    },
    /// An id with no entry in `pdfsets.index`.
    #[error("no PDF set known for global id {lhaid}")]
    IndexLookup {
        /// The unresolvable global member id.
        lhaid: i32,
    },
    /// Caller-side misuse, e.g. a member-value vector of the wrong length.
    #[error("{0}")]
    UserError(String),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;
