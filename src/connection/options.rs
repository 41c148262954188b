/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 14/10/26
******************************************************************************/
use crate::connection::management::BackoffPolicy;
use crate::message::DEFAULT_DATE_FIELDS;
use crate::utils::WebsocketError;
use std::time::Duration;

/// Tuning knobs for a session: retry budget, backoff, connect timeout and which
/// fields carry dates.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionOptions {
    /// Automatic reconnect attempts between two successful authentications
    pub max_retry_attempts: u32,
    /// Delay schedule before each automatic attempt
    pub backoff: BackoffPolicy,
    /// Maximum time a transport may stay in CONNECTING (`None` disables the check)
    pub connect_timeout: Option<Duration>,
    /// Payload fields converted to instants
    pub date_fields: Vec<String>,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            max_retry_attempts: 3,
            backoff: BackoffPolicy::default(),
            connect_timeout: Some(Duration::from_secs(10)),
            date_fields: DEFAULT_DATE_FIELDS.iter().map(|f| f.to_string()).collect(),
        }
    }
}

impl ConnectionOptions {
    /// Creates options with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Options with short delays, handy for tests and local development
    pub fn fast() -> Self {
        Self {
            backoff: BackoffPolicy::Fixed(Duration::from_millis(50)),
            connect_timeout: Some(Duration::from_secs(2)),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_max_retry_attempts(mut self, max_retry_attempts: u32) -> Self {
        self.max_retry_attempts = max_retry_attempts;
        self
    }

    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, connect_timeout: Option<Duration>) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    #[must_use]
    pub fn with_date_fields<I, S>(mut self, date_fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.date_fields = date_fields.into_iter().map(Into::into).collect();
        self
    }

    /// Validates the configuration
    ///
    /// # Errors
    ///
    /// Returns `WebsocketError::InvalidOptions` describing the first problem found.
    pub fn validate(&self) -> Result<(), WebsocketError> {
        self.backoff.validate().map_err(WebsocketError::InvalidOptions)?;

        if let Some(timeout) = self.connect_timeout
            && timeout.is_zero()
        {
            return Err(WebsocketError::InvalidOptions(
                "connect_timeout must be greater than 0".to_string(),
            ));
        }

        if self.date_fields.iter().any(|field| field.is_empty()) {
            return Err(WebsocketError::InvalidOptions(
                "date field names must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ConnectionOptions::default();
        assert_eq!(options.max_retry_attempts, 3);
        assert_eq!(
            options.backoff,
            BackoffPolicy::Fixed(Duration::from_millis(1000))
        );
        assert_eq!(options.connect_timeout, Some(Duration::from_secs(10)));
        assert_eq!(options.date_fields, vec!["created", "started", "finished"]);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let options = ConnectionOptions::new()
            .with_max_retry_attempts(5)
            .with_backoff(BackoffPolicy::Fixed(Duration::from_millis(10)))
            .with_connect_timeout(None)
            .with_date_fields(["created_at"]);

        assert_eq!(options.max_retry_attempts, 5);
        assert_eq!(options.backoff, BackoffPolicy::Fixed(Duration::from_millis(10)));
        assert_eq!(options.connect_timeout, None);
        assert_eq!(options.date_fields, vec!["created_at"]);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_validation_errors() {
        let zero_timeout = ConnectionOptions::new().with_connect_timeout(Some(Duration::ZERO));
        assert!(matches!(
            zero_timeout.validate(),
            Err(WebsocketError::InvalidOptions(_))
        ));

        let zero_backoff = ConnectionOptions::new().with_backoff(BackoffPolicy::Fixed(Duration::ZERO));
        assert!(zero_backoff.validate().is_err());

        let empty_field = ConnectionOptions::new().with_date_fields([""]);
        assert!(empty_field.validate().is_err());
    }

    #[test]
    fn test_fast_is_valid() {
        assert!(ConnectionOptions::fast().validate().is_ok());
    }
}
