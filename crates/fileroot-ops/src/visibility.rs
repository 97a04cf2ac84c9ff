//! Process-wide "show hidden files" switch.

use std::sync::atomic::{AtomicBool, Ordering};

/// Whether listings include dot-files. Concurrent writers race; the last one
/// wins.
#[derive(Debug, Default)]
pub struct HiddenFiles {
    show: AtomicBool,
}

impl HiddenFiles {
    /// Create the switch in the given position.
    pub fn new(show: bool) -> Self {
        Self {
            show: AtomicBool::new(show),
        }
    }

    /// Current position.
    pub fn get(&self) -> bool {
        self.show.load(Ordering::Relaxed)
    }

    /// Force the switch to `force`, or flip it when `None`. Returns the new
    /// position.
    pub fn toggle(&self, force: Option<bool>) -> bool {
        match force {
            Some(show) => {
                self.show.store(show, Ordering::Relaxed);
                show
            }
            None => !self.show.fetch_xor(true, Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggle() {
        let hidden = HiddenFiles::default();
        assert!(!hidden.get());
        assert!(hidden.toggle(None));
        assert!(hidden.get());
        assert!(!hidden.toggle(None));
        assert!(hidden.toggle(Some(true)));
        assert!(hidden.toggle(Some(true)));
        assert!(!hidden.toggle(Some(false)));
        assert!(!hidden.get());
    }
}
