pub mod engine;
pub mod error;
pub mod guard;
pub mod liveness;
pub mod registry;
pub mod session;
pub mod sink;
pub mod stats;

pub use engine::{DeliveryEngine, EngineConfig};
pub use error::EngineError;
pub use guard::{is_loopback, AccessGuard};
pub use liveness::start_monitor;
pub use registry::SessionRegistry;
pub use session::{Delivery, Session};
pub use sink::{CallbackSink, EventSink};
pub use stats::{DeliveryStats, StatsSnapshot};
