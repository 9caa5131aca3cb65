use std::error;
use std::fmt;

use nom::Err;

use crate::trace::RegionId;

#[derive(PartialEq, Eq, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// Malformed trace or static-info text
    ParseError(String),
    /// A region's samples could not be aggregated; the region is skipped
    TraceError { region: RegionId, reason: String },
    /// Elementwise arithmetic on vectors of different lengths
    LengthMismatch { left: usize, right: usize },
    /// A region's weighted profile sums to zero
    NormalizationError(String),
    /// A marker, region or block lookup missed
    NotFound(String),
    /// Request rejected before any computation
    InvalidRequest(String),
    /// Failure reported by the numerical backend
    ClusteringError(String),
}

impl Error {
    pub(crate) fn trace(region: RegionId, reason: impl Into<String>) -> Self {
        Error::TraceError {
            region,
            reason: reason.into(),
        }
    }

    /// Whether the marker engine may skip the offending region and carry on.
    ///
    /// Only per-region trace problems are recoverable. A length mismatch means the
    /// block map and the aggregated vectors disagree, which poisons every later region.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Error::TraceError { .. })
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::ParseError(s)
            | Error::NormalizationError(s)
            | Error::NotFound(s)
            | Error::InvalidRequest(s)
            | Error::ClusteringError(s) => write!(f, "{s}"),
            Error::TraceError { region, reason } => {
                write!(f, "region {region}: {reason}")
            }
            Error::LengthMismatch { left, right } => {
                write!(f, "vector length mismatch: {left} != {right}")
            }
        }
    }
}

impl error::Error for Error {}

impl From<nom::error::Error<&str>> for Error {
    fn from(err: nom::error::Error<&str>) -> Self {
        Error::ParseError(format!(
            "Parsing error: {} at {:?}",
            err.code.description(),
            err.input
        ))
    }
}

impl From<Err<nom::error::Error<&str>>> for Error {
    fn from(err: Err<nom::error::Error<&str>>) -> Self {
        match err {
            Err::Error(e) | Err::Failure(e) => Error::from(e),
            Err::Incomplete(_) => {
                Error::ParseError(String::from("Parsing error: incomplete input"))
            }
        }
    }
}
