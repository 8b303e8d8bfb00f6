//! Chat message reconciliation: streaming, state machine, edits and the
//! shared streaming lock.

pub mod alert;
pub mod config;
pub mod decode;
pub mod edit;
pub mod interrupt;
pub mod lock;
pub mod logging;
pub mod machine;
pub mod session;
pub mod store;
pub mod stream;
pub mod view;

pub use alert::{Alert, AlertSink, ChannelAlerts, LogAlerts};
pub use config::Config;
pub use decode::decode_display_text;
pub use edit::EditError;
pub use lock::{LockGate, LockWatch};
pub use machine::{Effect, MachineEvent, MessageMachine, MessagePhase};
pub use session::{Collaborators, Session, SessionContext, SessionUpdate};
pub use store::{HttpMessageStore, MessageStore, StoreError, StoreErrorKind};
pub use stream::{Connector, HttpConnector, StreamError, StreamEvent, StreamHandle};
pub use view::{ViewState, present};
