//! Process exit codes
//!
//! Scripts branch on these values, so they never change once released. A
//! failed transfer exits with the code of its innermost cause: a download
//! whose size lookup hit a missing key exits with [`ExitCode::NotFound`],
//! not with a generic failure.

use std::fmt;

use sc_core::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,

    /// Local IO failures and anything not classified below
    GeneralError = 1,

    /// Bad flags, URI, config file or transfer parameters
    UsageError = 2,

    /// Transport failure or unclassified service error; re-running may help
    NetworkError = 3,

    /// Credentials rejected or lacking permission
    AuthError = 4,

    /// Bucket, key or multipart upload does not exist
    NotFound = 5,

    /// Server-side precondition failed (HTTP 409/412)
    Conflict = 6,

    /// Backend does not implement the request, e.g. multipart on a minimal store
    UnsupportedFeature = 7,

    /// Ctrl+C before the transfer finished
    Interrupted = 130,
}

impl ExitCode {
    pub const fn as_i32(self) -> i32 {
        self as i32
    }

    /// Code for a raw value, `None` outside the table
    pub const fn from_i32(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Success),
            1 => Some(Self::GeneralError),
            2 => Some(Self::UsageError),
            3 => Some(Self::NetworkError),
            4 => Some(Self::AuthError),
            5 => Some(Self::NotFound),
            6 => Some(Self::Conflict),
            7 => Some(Self::UnsupportedFeature),
            130 => Some(Self::Interrupted),
            _ => None,
        }
    }

    /// Short label used in debug logs
    pub const fn label(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::GeneralError => "general",
            Self::UsageError => "usage",
            Self::NetworkError => "network",
            Self::AuthError => "auth",
            Self::NotFound => "not-found",
            Self::Conflict => "conflict",
            Self::UnsupportedFeature => "unsupported",
            Self::Interrupted => "interrupted",
        }
    }
}

impl From<&Error> for ExitCode {
    fn from(error: &Error) -> Self {
        Self::from_i32(error.exit_code()).unwrap_or(Self::GeneralError)
    }
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.label(), self.as_i32())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_error_code_is_in_the_table() {
        let errors = [
            Error::General("boom".into()),
            Error::InvalidJob("concurrency must be at least 1".into()),
            Error::Network("reset".into()),
            Error::Auth("AccessDenied".into()),
            Error::NotFound("NoSuchKey".into()),
            Error::Conflict("PreconditionFailed".into()),
            Error::Unsupported("NotImplemented".into()),
        ];
        for error in &errors {
            let code = ExitCode::from(error);
            assert_eq!(code.as_i32(), error.exit_code(), "{error}");
        }
    }

    #[test]
    fn test_exit_code_from_transfer_errors() {
        let not_found = Error::planning(Error::NotFound("s3://b/k".into()));
        assert_eq!(ExitCode::from(&not_found), ExitCode::NotFound);

        let piece = Error::PieceTransfer {
            index: 3,
            start: 30,
            end: 39,
            source: Box::new(Error::Network("reset".into())),
        };
        assert_eq!(ExitCode::from(&piece), ExitCode::NetworkError);

        let write = Error::Write {
            index: 0,
            offset: 0,
            source: std::io::Error::other("disk full"),
        };
        assert_eq!(ExitCode::from(&write), ExitCode::GeneralError);

        let complete = Error::session(
            sc_core::SessionStage::Complete,
            Error::Unsupported("NotImplemented".into()),
        );
        assert_eq!(ExitCode::from(&complete), ExitCode::UnsupportedFeature);
    }

    #[test]
    fn test_unknown_value_is_rejected() {
        assert_eq!(ExitCode::from_i32(130), Some(ExitCode::Interrupted));
        assert_eq!(ExitCode::from_i32(99), None);
    }

    #[test]
    fn test_display_shows_label_and_value() {
        assert_eq!(ExitCode::Conflict.to_string(), "conflict (6)");
        assert_eq!(ExitCode::Interrupted.to_string(), "interrupted (130)");
    }
}
