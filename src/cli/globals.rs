use crate::api::email::SmtpConfig;
use secrecy::SecretString;
use std::path::PathBuf;

/// Runtime settings shared by the server beyond port and DSN.
#[derive(Debug, Clone)]
pub struct GlobalArgs {
    pub token_secret: SecretString,
    pub token_ttl_hours: i64,
    pub avatar_dir: PathBuf,
    pub smtp: Option<SmtpConfig>,
}

impl GlobalArgs {
    #[must_use]
    pub fn new(token_secret: SecretString) -> Self {
        Self {
            token_secret,
            token_ttl_hours: 1000,
            avatar_dir: PathBuf::from("uploads/avatars"),
            smtp: None,
        }
    }
}
