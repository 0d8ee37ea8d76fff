use std::{error::Error, str::FromStr};

use snafu::{whatever, ResultExt, Whatever};

/// Reads an environment variable, loading a `.env` file from the current or
/// parent directories first.
///
/// Unlike [std::env::var] an unset variable is `Ok(None)`, not an error.
#[track_caller]
pub fn var(key: &str) -> Result<Option<String>, Whatever> {
    match dotenvy::var(key) {
        Ok(content) => Ok(Some(content)),
        Err(dotenvy::Error::EnvVar(std::env::VarError::NotPresent)) => Ok(None),
        Err(error) => whatever!(Err(error), "Failed to read {key} environment variable"),
    }
}

/// Like [var], and parses the value when it is set.
#[track_caller]
pub fn var_parsed<R>(key: &str) -> Result<Option<R>, Whatever>
where
    R: FromStr,
    R::Err: Error + Send + Sync + 'static,
{
    match var(key)? {
        Some(content) => {
            let parsed = content
                .parse()
                .with_whatever_context(|e| format!("Failed to parse {key} environment variable; {e}"))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

/// Replace `value` with the content of `key` when that variable is set.
pub fn override_from(key: &str, value: &mut String) -> Result<bool, Whatever> {
    match var(key)? {
        Some(content) => {
            *value = content;
            Ok(true)
        }
        None => Ok(false),
    }
}
