//! Ctrl+C handling for long crawls.
//!
//! The first SIGINT or SIGTERM cancels the walker's token, so the current
//! page finishes and the records gathered so far are still written out.
//! A second signal exits immediately.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Exit status used when a second signal forces the process down.
pub const FORCED_EXIT_CODE: i32 = 130;

/// Spawn the signal listener and return the token it cancels.
///
/// Must be called from within a tokio runtime.
#[must_use]
pub fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let count = Arc::new(AtomicU32::new(0));

    let handler_token = token.clone();
    tokio::spawn(async move {
        #[cfg(unix)]
        let mut sigterm = {
            use tokio::signal::unix::{SignalKind, signal};
            match signal(SignalKind::terminate()) {
                Ok(sig) => Some(sig),
                Err(e) => {
                    warn!(error = %e, "Could not listen for SIGTERM");
                    None
                }
            }
        };

        loop {
            #[cfg(unix)]
            {
                if let Some(sigterm) = sigterm.as_mut() {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => {}
                        _ = sigterm.recv() => {}
                    }
                } else if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!(error = %e, "Could not listen for Ctrl+C");
                    return;
                }
            }

            #[cfg(not(unix))]
            {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!(error = %e, "Could not listen for Ctrl+C");
                    return;
                }
            }

            if !register_signal(&count, &handler_token) {
                warn!("Force exit requested");
                std::process::exit(FORCED_EXIT_CODE);
            }
        }
    });

    token
}

/// Count one signal. Cancels on the first and returns `false` from the
/// second onwards.
fn register_signal(count: &AtomicU32, token: &CancellationToken) -> bool {
    if count.fetch_add(1, Ordering::SeqCst) == 0 {
        info!("Stopping after the current page, press Ctrl+C again to quit now");
        token.cancel();
        true
    } else {
        false
    }
}
