use bitflags::bitflags;

bitflags! {
    pub struct LogState: u8 {
        const UNKNOWN = 0; // unknown log state
        const MISSING = 1; // missing log(s)
        const CLEAR = 2; // clear the log(s)
        const GOOD = 3; // log(s) are good
    }
}

/// Turns on the `log` facade for a test run, the way an embedding
/// application's own `env_logger::init()` would at startup — this crate
/// is a library with no such entry point of its own, so tests that want
/// to see `log::info!`/`warn!` output (txg syncs, self-heal, scrub
/// progress) call this first. Safe to call from more than one test;
/// only the first call takes effect.
#[cfg(test)]
pub fn init_test_logging() {
    let _ = env_logger::try_init();
}
