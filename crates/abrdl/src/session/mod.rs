pub mod events;
pub mod protection;
pub mod range_transport;
pub mod stream_session;
pub mod transport;

pub use events::{ProtectionState, ProtectionStatus, SessionEvent, SessionState, SessionStatus};
pub use range_transport::{RangeTransport, RangeTransportConfig};
pub use stream_session::{SessionContext, StreamSession};
pub use transport::{
    AdaptiveTransport, OpenRequest, OpenedTransport, TrackStream, TransportControl, TransportEvents,
};
