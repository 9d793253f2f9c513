pub mod keys;
pub mod media;
pub mod server;

use std::{env, path::PathBuf, sync::Once};

pub use anyhow;
use rand::distributions::{Alphanumeric, DistString};
use tracing_subscriber::EnvFilter;

/// A path in the temporary directory which does not exist yet
pub fn random_temp_file<S: AsRef<str>>(extension: S) -> PathBuf {
    let id = Alphanumeric.sample_string(&mut rand::thread_rng(), 16);
    env::temp_dir().join(format!("avcf-{id}.{}", extension.as_ref()))
}

static LOGGING: Once = Once::new();

/// Sends logs to the test output, filtered by `RUST_LOG`
pub fn init_logging() {
    LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}
