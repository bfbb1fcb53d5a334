pub mod net;
pub mod session;

pub use net::{ClientConfig, Transport};
pub use session::{RegisterReply, SessionController, SessionError, SessionState};
