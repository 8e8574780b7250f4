use std::fmt;

/// General status codes (Appendix D.3), reported back to MQTT clients as strings
#[repr(u16)]
#[derive(FromPrimitive, PartialEq, Eq, Debug, Clone, Copy)]
pub enum GeneralCode {
    Success = 0,
    Failure,
    BadPrecondition,
    OutOfRange,
    BadRequest,
    Unsupported,
    Unexpected,
    ResourceExhausted,
    Busy,
    Timeout,
    Continue,
    Aborted,
    InvalidArgument,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    DataLoss,
}

impl GeneralCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
            Self::BadPrecondition => "BAD_PRECONDITION",
            Self::OutOfRange => "OUT_OF_RANGE",
            Self::BadRequest => "BAD_REQUEST",
            Self::Unsupported => "UNSUPPORTED",
            Self::Unexpected => "UNEXPECTED",
            Self::ResourceExhausted => "RESOURCE_EXHAUSTED",
            Self::Busy => "BUSY",
            Self::Timeout => "TIMEOUT",
            Self::Continue => "CONTINUE",
            Self::Aborted => "ABORTED",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::NotFound => "NOT_FOUND",
            Self::AlreadyExists => "ALREADY_EXISTS",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::DataLoss => "DATA_LOSS",
        }
    }

    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

impl fmt::Display for GeneralCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
