//! Customized string-based error type.

use std::error;
use std::fmt;
use std::io;
use std::net;
use std::num;

/// Customized error type for coronet. Carries just an error message; all
/// fallible paths propagate it with `?`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoronetError(pub String);

impl CoronetError {
    /// Constructs an error out of anything printable.
    pub fn msg(m: impl ToString) -> Self {
        CoronetError(m.to_string())
    }
}

impl fmt::Display for CoronetError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl error::Error for CoronetError {}

/// Helper macro for saving boiler-plate `From` conversions from common
/// library error types.
macro_rules! impl_from_error {
    ($error:ty) => {
        impl From<$error> for CoronetError {
            fn from(e: $error) -> Self {
                CoronetError(e.to_string())
            }
        }
    };
}

impl_from_error!(io::Error);
impl_from_error!(net::AddrParseError);
impl_from_error!(num::ParseIntError);
impl_from_error!(toml::de::Error);
impl_from_error!(bincode::Error);

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for CoronetError {
    fn from(e: tokio::sync::mpsc::error::SendError<T>) -> Self {
        CoronetError(e.to_string())
    }
}

impl From<tokio::sync::watch::error::RecvError> for CoronetError {
    fn from(e: tokio::sync::watch::error::RecvError) -> Self {
        CoronetError(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_message() {
        let e = CoronetError::msg("oops");
        assert_eq!(format!("{}", e), "oops");
    }

    #[test]
    fn from_io_error() {
        let io_err = io::Error::new(io::ErrorKind::ConnectionRefused, "refused");
        let e: CoronetError = io_err.into();
        assert!(e.0.contains("refused"));
    }

    #[test]
    fn from_parse_error() {
        let parse_err = "abc".parse::<u64>().unwrap_err();
        let e: CoronetError = parse_err.into();
        assert!(!e.0.is_empty());
    }
}
