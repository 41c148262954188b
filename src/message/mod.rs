/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 14/10/26
******************************************************************************/
mod model;
mod normalizer;

pub use model::{
    AuthenticationFrame, AuthenticationResult, AuthenticationStatus, CanonicalMessage, FieldValue,
    InboundMessage, MessageKind,
};
pub use normalizer::{DEFAULT_DATE_FIELDS, Normalizer, camel_case_key, parse_utc_timestamp};
