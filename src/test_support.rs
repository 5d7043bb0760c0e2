// Shared helpers for unit tests.

use std::sync::{Mutex, MutexGuard};

static BACKEND_RNG: Mutex<()> = Mutex::new(());

/// Serialises tests that initialise parameters from the backend's
/// global generator, so a seeded test sees an undisturbed stream.
pub fn backend_rng_lock() -> MutexGuard<'static, ()> {
    BACKEND_RNG.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
