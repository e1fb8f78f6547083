use longpoll_core::AccessError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("access error: {0}")]
    Access(#[from] AccessError),

    #[error("duplicate session name: {0}")]
    DuplicateName(String),

    #[error("session {0} shares its token with another session")]
    DuplicateCredential(String),

    #[error("session name must not be empty")]
    EmptyName,

    #[error("session {0} has an empty token")]
    EmptyCredential(String),
}
