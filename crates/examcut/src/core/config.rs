//! CLI/env-var override application over a [`JobConfig`].
//!
//! Defaults live on the config type itself, and callers layer overrides on
//! top rather than constructing a second, parallel "raw args" type.

use crate::types::{JobConfig, RemoteCredentials, Strategy};

#[derive(Debug, Default)]
pub struct ConfigOverrides {
    pub strategy: Option<Strategy>,
    pub dpi: Option<u32>,
    pub max_retries: Option<u32>,
    pub remote_credentials: Option<RemoteCredentials>,
}

pub fn apply_overrides(mut config: JobConfig, overrides: ConfigOverrides) -> JobConfig {
    if let Some(strategy) = overrides.strategy {
        config.strategy = strategy;
    }
    if let Some(dpi) = overrides.dpi {
        config.dpi = dpi;
    }
    if let Some(max_retries) = overrides.max_retries {
        config.max_retries = max_retries;
    }
    if overrides.remote_credentials.is_some() {
        config.remote_credentials = overrides.remote_credentials;
    }
    config
}

/// Read `REMOTE_OCR_APP_ID` / `REMOTE_OCR_APP_KEY` from the environment.
/// Returns `None` if either is unset.
pub fn credentials_from_env() -> Option<RemoteCredentials> {
    let app_id = std::env::var("REMOTE_OCR_APP_ID").ok()?;
    let app_key = std::env::var("REMOTE_OCR_APP_KEY").ok()?;
    Some(RemoteCredentials { app_id, app_key })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_replace_only_set_fields() {
        let base = JobConfig::default();
        let overridden = apply_overrides(
            base,
            ConfigOverrides { dpi: Some(300), ..Default::default() },
        );
        assert_eq!(overridden.dpi, 300);
        assert_eq!(overridden.strategy, Strategy::LocalThenRemote);
    }
}
