pub mod channels;
pub mod games;
pub mod messages;
pub mod streams;
pub mod users;

pub use channels::Channel;
pub use games::Game;
pub use messages::Message;
pub use streams::{Stream, StreamType};
pub use users::{BroadcasterType, User, UserType, Viewer};
