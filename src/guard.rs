use std::sync::atomic::{AtomicBool, Ordering};

/// In-flight flag for an action that issues a remote call.
#[derive(Debug, Default)]
pub struct InFlight {
    flag: AtomicBool,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `None` while a previous token is still alive.
    pub fn try_begin(&self) -> Option<InFlightToken<'_>> {
        self.flag
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightToken { flag: &self.flag })
    }

    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Clears the flag on drop, whichever way the action ends.
#[derive(Debug)]
pub struct InFlightToken<'a> {
    flag: &'a AtomicBool,
}

impl Drop for InFlightToken<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_begin_is_refused_until_drop() {
        let guard = InFlight::new();
        let token = guard.try_begin().unwrap();
        assert!(guard.is_set());
        assert!(guard.try_begin().is_none());
        drop(token);
        assert!(!guard.is_set());
        assert!(guard.try_begin().is_some());
    }

    #[test]
    fn test_cleared_on_error_path() {
        let guard = InFlight::new();
        let run = || -> Result<(), &'static str> {
            let _token = guard.try_begin().ok_or("busy")?;
            Err("remote failed")
        };
        assert_eq!(run(), Err("remote failed"));
        assert!(!guard.is_set());
    }
}
