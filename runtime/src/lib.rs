mod logger;

use log::LevelFilter;

static LOGGER: logger::Logger = logger::Logger;

/// Installs the colored stderr logger as the global `log` backend.
///
/// Intended to be called once, near the start of a host application, before any pump is
/// driven. Subsequent calls are no-ops (matching `log::set_logger`'s own contract).
pub fn init(filter: LevelFilter) {
	if log::set_logger(&LOGGER).is_ok() {
		log::set_max_level(filter);
	}
}
