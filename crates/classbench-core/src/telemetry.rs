//! Log output for `classbench`: plain progress lines by default, NDJSON
//! events with `--json`.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the process-wide subscriber. `RUST_LOG` takes precedence over
/// `level`. Progress lines such as `[3/14] item_003 ... OK` are `info`;
/// reasoning previews are `debug`.
///
/// Returns `false` if a subscriber was already in place, which is then kept.
pub fn init_tracing(json: bool, level: Level) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    let registry = tracing_subscriber::registry().with(filter);

    let installed = if json {
        registry
            .with(fmt::layer().with_target(false).json())
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(false).without_time())
            .try_init()
    };
    installed.is_ok()
}
