use std::time::Instant;

/// Scope guard that logs how long a stage took when it is dropped
pub struct ProfileScope {
    label: String,
    start: Instant,
}

impl ProfileScope {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Drop for ProfileScope {
    fn drop(&mut self) {
        log::debug!("[PROFILE] {} - {:.3}ms", self.label, self.elapsed_ms());
    }
}

/// Macro for easy profiling
#[macro_export]
macro_rules! profile_scope {
    ($label:expr) => {
        let _profile_scope = $crate::profiling::ProfileScope::new($label);
    };
}
