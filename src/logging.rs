use std::sync::Once;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

static INIT: Once = Once::new();

/// Installs the global subscriber. Reads `VLJEPA_LOG` (e.g.
/// `VLJEPA_LOG=vljepa_server_lib=debug`), falling back to info for this crate.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env("VLJEPA_LOG")
            .unwrap_or_else(|_| EnvFilter::new("vljepa_server_lib=info,vljepa_server=info"));

        tracing_subscriber::registry()
            .with(fmt::layer().with_target(true))
            .with(filter)
            .init();
    });
}
