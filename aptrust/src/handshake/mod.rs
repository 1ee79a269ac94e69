pub mod messages;
pub mod protocol;
pub mod state;

pub use messages::{decline_reason_label, ClientInfo, Welcome};
pub use protocol::{HandshakeOutcome, Initiator, Responder, ResponderOutcome};
pub use state::HandshakeState;
