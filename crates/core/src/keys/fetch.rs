use std::{io, time::Duration};

use thiserror::Error;

/// Responses larger than this are not treated as keys
pub const MAX_KEY_SIZE: u64 = 1024 * 1024;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("server responded with status {0}")]
    Status(u16),
    #[error("request failed: {0}")]
    Transport(String),
    #[error("response is larger than 1 MiB")]
    TooLarge,
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Downloads armored public keys
pub trait KeyFetcher: Send + Sync {
    fn fetch(&self, url: &str, timeout: Duration) -> Result<String, FetchError>;
}

/// Fetches keys with a blocking HTTP(S) `GET`, anything but a 2xx response
/// is a failure
#[cfg(feature = "fetch")]
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpKeyFetcher;

#[cfg(feature = "fetch")]
impl KeyFetcher for HttpKeyFetcher {
    fn fetch(&self, url: &str, timeout: Duration) -> Result<String, FetchError> {
        use std::io::Read;

        let agent = ureq::AgentBuilder::new().timeout(timeout).build();

        let response = agent.get(url).call().map_err(|e| match e {
            ureq::Error::Status(code, _) => FetchError::Status(code),
            ureq::Error::Transport(t) => FetchError::Transport(t.to_string()),
        })?;

        let mut body = String::new();
        response
            .into_reader()
            .take(MAX_KEY_SIZE + 1)
            .read_to_string(&mut body)?;

        if body.len() as u64 > MAX_KEY_SIZE {
            return Err(FetchError::TooLarge);
        }

        Ok(body)
    }
}
