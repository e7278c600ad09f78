use std::io;

use dotenvy::dotenv;
use tracing::warn;

/// Loads a local `.env` if there is one, so the `PROVER_*` settings can live
/// next to the binary instead of in the shell.
///
/// A missing or unreadable file is not an error.
pub fn load_dotenvy_vars_if_present() {
    match dotenv() {
        Ok(_) | Err(dotenvy::Error::Io(io::Error { .. })) => (),
        Err(e) => warn!("found local `.env` file but was unable to parse it: {e}"),
    }
}
