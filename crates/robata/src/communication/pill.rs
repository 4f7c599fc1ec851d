use std::thread;

/// # Pill
///
/// A panic propagation guard carried by supervisor tasks.
///
/// ## Purpose
///
/// A batch job's supervisor owns the result map and the event channel; if it
/// panics silently, the job's consumers would wait on a stream that never
/// ends. The `Pill` rides inside the supervisor and turns that silent death
/// into a loud one.
///
/// ## Implementation Strategy
///
/// `Pill` combines the `Drop` trait with `thread::panicking()`: when dropped
/// during unwinding it panics again, so the fault cannot be swallowed by a
/// caller that merely observes the value going away.
pub struct Pill {}

impl Pill {
    /// Creates a new guard to move into a supervisor task.
    pub fn new() -> Self {
        Self {}
    }
}

impl Drop for Pill {
    fn drop(&mut self) {
        if thread::panicking() {
            panic!("supervisor task panicked - propagating");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pill_is_silent_on_normal_drop() {
        let pill = Pill::new();
        drop(pill);
    }

    #[test]
    fn test_pill_repanics_when_dropped_during_unwind() {
        let result = thread::spawn(|| {
            let _pill = Pill::new();
            panic!("original fault");
        })
        .join();

        assert!(result.is_err());
    }
}
