//! Logging initialization
//!
//! Hosts that want dbcell's debug output call [`init`] once; everything in
//! the crate logs through `tracing`. The filter honors `RUST_LOG` and
//! defaults to info-level events from this crate only.
use tracing_subscriber::EnvFilter;

pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("dbcell=info"));
    // A host may have installed its own subscriber already; that is fine.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init();
}
