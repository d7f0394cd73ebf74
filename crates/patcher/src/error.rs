use core::fmt::{Display, Formatter, Result as FmtResult};
use std::error::Error;

/// Failure outcomes of the patching engine.
///
/// DOM-level problems never escape as errors from periodic work; they are
/// turned into `false`/`None` replies. Only persistence and channel failures
/// reach the control surface.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PatchError {
    /// No element matches the selector.
    TargetNotFound(String),
    /// No stable selector could be derived for the element.
    UnresolvableSelector(String),
    /// A style value without a `property:value` pair.
    MalformedStyleValue(String),
    /// A numeric value that did not parse; it is written as `0`.
    NumericParseFailure(String),
    /// Reading or writing the backing store failed.
    PersistenceFailure(String),
    /// The other end of a message round-trip has gone away.
    ChannelClosed(&'static str),
}

impl PatchError {
    /// Text suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            Self::TargetNotFound(_) => "Target not found on this page.".to_owned(),
            Self::UnresolvableSelector(_) => "Could not identify that element.".to_owned(),
            Self::MalformedStyleValue(_) => {
                "Style values must look like property:value.".to_owned()
            }
            Self::NumericParseFailure(_) => "That is not a number; 0 was used.".to_owned(),
            Self::PersistenceFailure(message) => format!("Could not save changes: {message}"),
            Self::ChannelClosed(_) => "The page is no longer available.".to_owned(),
        }
    }
}

impl Display for PatchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::TargetNotFound(selector) => write!(f, "TargetNotFound: {selector}"),
            Self::UnresolvableSelector(reason) => write!(f, "UnresolvableSelector: {reason}"),
            Self::MalformedStyleValue(value) => write!(f, "MalformedStyleValue: {value:?}"),
            Self::NumericParseFailure(value) => write!(f, "NumericParseFailure: {value:?}"),
            Self::PersistenceFailure(message) => write!(f, "PersistenceFailure: {message}"),
            Self::ChannelClosed(peer) => write!(f, "ChannelClosed: {peer}"),
        }
    }
}

impl Error for PatchError {}
