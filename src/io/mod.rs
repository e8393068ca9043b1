pub mod port;
pub mod snapshot;

pub use port::{BackendKind, InputSource, IoPort, LivePort, PortError, ReplayPort};
pub use snapshot::{Actuation, FieldValue, InputSnapshot};
