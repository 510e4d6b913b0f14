pub mod control;
pub mod header;
pub mod map;
pub mod poll;

use std::path::Path;

use dishstat_core::{DEFAULT_TARGET, DishGateway, ReplayConnector};

/// Open a gateway to `target` served from a replay capture.
///
/// This binary carries no live dish transport, so a capture is required.
pub fn make_gateway(target: Option<&str>, replay: Option<&Path>) -> DishGateway<ReplayConnector> {
    let target = target.unwrap_or(DEFAULT_TARGET);
    let Some(path) = replay else {
        eprintln!("Error: no dish transport is built in; pass --replay <capture.json>");
        std::process::exit(1);
    };
    match ReplayConnector::load(path) {
        Ok(connector) => DishGateway::new(connector, target),
        Err(e) => {
            eprintln!("Error loading replay capture {}: {e}", path.display());
            std::process::exit(1);
        }
    }
}
