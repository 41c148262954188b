/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 14/10/26
******************************************************************************/
use std::fmt;
use uuid::Uuid;

/// Process-unique identifier of a client, used as the last path segment of the
/// transport address so the server can address this client.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientIdentity(String);

impl ClientIdentity {
    /// Generates a new random (version 4) identity.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ClientIdentity {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_is_uuid_shaped() {
        let identity = ClientIdentity::new();
        let parsed = Uuid::parse_str(identity.as_str()).unwrap();
        assert_eq!(parsed.get_version_num(), 4);
        assert_eq!(identity.to_string(), identity.as_str());
    }

    #[test]
    fn test_identities_are_unique() {
        assert_ne!(ClientIdentity::new(), ClientIdentity::new());
    }
}
