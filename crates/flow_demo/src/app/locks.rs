use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use tracing::warn;

static HOST_LOCK_POISON_WARNED: AtomicBool = AtomicBool::new(false);

fn warn_host_lock_poison_once(operation: &'static str) {
    if HOST_LOCK_POISON_WARNED
        .compare_exchange(false, true, Ordering::Relaxed, Ordering::Relaxed)
        .is_ok()
    {
        warn!(operation, "host lock poisoned; recovered inner value");
    }
}

pub(crate) fn lock_or_recover<'a, T>(
    mutex: &'a Mutex<T>,
    operation: &'static str,
) -> MutexGuard<'a, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn_host_lock_poison_once(operation);
            poisoned.into_inner()
        }
    }
}
