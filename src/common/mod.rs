pub mod events;
pub mod identity;
pub mod types;

pub use events::ChatEvent;
pub use identity::{IdentityProvider, StaticIdentity};
pub use types::{ANONYMOUS, Message, UNKNOWN_SESSION, session_or_unknown};
