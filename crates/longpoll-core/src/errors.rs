/// Why a request was turned away before reaching a mailbox.
///
/// None of these are retried; each maps to an HTTP status and a short body.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum AccessError {
    #[error("request did not originate from the loopback interface")]
    ForbiddenOrigin,
    #[error("credential does not match any configured session")]
    UnknownCredential,
    #[error("no session registered under {0}")]
    UnknownSession(String),
    #[error("post body has no type")]
    MissingType,
}

/// Which endpoint rejected the request. Poll and post report credential failures differently.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Endpoint {
    Poll,
    Post,
}

impl AccessError {
    /// HTTP status for this rejection on the given endpoint.
    pub fn status_for(&self, endpoint: Endpoint) -> u16 {
        match (self, endpoint) {
            (Self::ForbiddenOrigin, _) => 403,
            (_, Endpoint::Poll) => 403,
            (_, Endpoint::Post) => 400,
        }
    }

    /// Short body sent back with the status.
    pub fn message(&self) -> &'static str {
        match self {
            Self::ForbiddenOrigin => "Access denied",
            Self::UnknownCredential => "Invalid Token",
            Self::UnknownSession(_) => "Invalid User",
            Self::MissingType => "Invalid Type",
        }
    }

    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::ForbiddenOrigin => "forbidden_origin",
            Self::UnknownCredential => "unknown_credential",
            Self::UnknownSession(_) => "unknown_session",
            Self::MissingType => "missing_type",
        }
    }
}
