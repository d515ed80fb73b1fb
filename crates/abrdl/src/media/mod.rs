pub mod format;
pub mod identifier;
pub mod selection;

pub use format::{Container, FormatDescriptor, TrackType};
pub use identifier::VideoIdentifier;
pub use selection::{TrackMode, TrackPreference, TrackSelection};
