//! Cross-collaborator call ordering recorder.

use std::sync::{Arc, Mutex};

/// Records the order of named collaborator calls across the nullable set.
/// Clones share one underlying log.
#[derive(Clone, Default)]
pub struct CallSequence {
    calls: Arc<Mutex<Vec<String>>>,
}

impl CallSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, name: &str) {
        self.calls.lock().expect("call log lock").push(name.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("call log lock").clone()
    }

    /// Position of the first call with this name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.calls
            .lock()
            .expect("call log lock")
            .iter()
            .position(|c| c == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_one_log() {
        let seq = CallSequence::new();
        let other = seq.clone();
        seq.record("first");
        other.record("second");
        assert_eq!(seq.calls(), vec!["first", "second"]);
        assert_eq!(seq.index_of("second"), Some(1));
        assert_eq!(seq.index_of("missing"), None);
    }
}
