pub mod bridge;
pub mod canvas;
pub mod config;
pub mod history;
pub mod layout;
pub mod memory;
pub mod schedule;
pub mod session;
pub mod sync;

pub use bridge::{DecodeError, EventKind, FormEvent, OutboundMessage};
pub use canvas::{Canvas, CanvasError, CanvasNodeId, NodeKind, NodePayload, Point};
pub use config::{CollisionPolicy, SyncConfig};
pub use memory::{MemoryCanvas, MemoryHost};
pub use schedule::RecomputeScheduler;
pub use session::{EventOutcome, Host, Session, SessionError};
pub use sync::{EntityClass, NodeSyncEngine, SyncPlan, SyncReport};
