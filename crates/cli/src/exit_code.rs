//! Process exit codes

use bcp_core::Error;

/// Exit status of a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    /// Bad arguments or locations
    UsageError = 2,
    /// The object store could not be reached or rejected a request
    NetworkError = 3,
    /// Local source or remote object does not exist
    NotFound = 5,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Pick the exit code for a failed copy
    pub fn from_error(error: &Error) -> Self {
        match error {
            Error::InvalidUsage(_)
            | Error::MalformedLocation(_)
            | Error::IllegalObjectPath(_)
            | Error::Config(_) => ExitCode::UsageError,
            Error::SourceNotFound(_) | Error::NotFound(_) => ExitCode::NotFound,
            Error::Network(_) => ExitCode::NetworkError,
            Error::Transfer { source, .. } => Self::from_error(source),
            _ => ExitCode::GeneralError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_values() {
        assert_eq!(ExitCode::Success.as_i32(), 0);
        assert_eq!(ExitCode::UsageError.as_i32(), 2);
        assert_eq!(ExitCode::NotFound.as_i32(), 5);
    }

    #[test]
    fn test_from_error() {
        assert_eq!(
            ExitCode::from_error(&Error::InvalidUsage("x".into())),
            ExitCode::UsageError
        );
        assert_eq!(
            ExitCode::from_error(&Error::SourceNotFound("x".into())),
            ExitCode::NotFound
        );
        assert_eq!(
            ExitCode::from_error(&Error::transfer("a", 1, Error::Network("x".into()))),
            ExitCode::NetworkError
        );
        assert_eq!(
            ExitCode::from_error(&Error::Io(std::io::Error::other("x"))),
            ExitCode::GeneralError
        );
    }
}
