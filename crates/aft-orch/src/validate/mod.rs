//! Traffic and header validation.

mod headers;
mod traffic;

pub use headers::{validate_headers, HeaderExpectation, HeaderMismatch, HeaderReport};
pub use traffic::{
    validate_distribution, RatioCheck, TrafficObservation, TrafficValidator, ValidationError,
    ValidationReport, DEFAULT_TOLERANCE,
};
