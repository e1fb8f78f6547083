pub mod errors;
pub mod ids;
pub mod messages;
pub mod security;

pub use errors::{AccessError, Endpoint};
pub use ids::{PollId, SessionName};
pub use messages::{InboundMessage, Message, PostBody, PostKind, CONNECT_TYPE, PROBE_MARKER};
pub use security::Credential;
