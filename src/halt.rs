use std::sync::atomic::{AtomicU32, Ordering};

static HALT: AtomicU32 = AtomicU32::new(0);

/// Install the Ctrl-C handler. Each signal bumps the counter; probes poll
/// [`halted`] between records and bail out. A second signal means cleanup
/// (cache save included) is skipped on exit.
pub fn install() {
    let _ = ctrlc::set_handler(|| {
        let n = HALT.fetch_add(1, Ordering::SeqCst) + 1;
        if n > 1 {
            std::process::exit(130);
        }
    });
}

pub fn halted() -> bool {
    HALT.load(Ordering::SeqCst) > 0
}

pub fn count() -> u32 {
    HALT.load(Ordering::SeqCst)
}
