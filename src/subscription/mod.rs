/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 14/10/26
******************************************************************************/
mod dispatcher;
mod listener;

pub use dispatcher::{DispatchReport, Dispatcher, SubscriberId};
pub use listener::{ChannelSubscriber, Subscriber};
