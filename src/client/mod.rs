/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 14/10/26
******************************************************************************/

mod builder;
mod driver;
mod identity;
/// Sans-IO session state machine.
pub mod session;

pub use builder::ClientBuilder;
pub use driver::{MessageReceiver, WebsocketClient};
pub use identity::ClientIdentity;
pub use session::{Action, AuthenticationHandler, Session, SessionState};
