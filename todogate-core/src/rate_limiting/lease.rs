use std::time::Duration;

/// Outcome of a single acquisition attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lease {
    acquired: bool,
    /// Time until enough tokens should be available, attached to denials
    pub retry_after: Option<Duration>,
}

impl Lease {
    pub const fn granted() -> Self {
        Self {
            acquired: true,
            retry_after: None,
        }
    }

    pub const fn denied(retry_after: Option<Duration>) -> Self {
        Self {
            acquired: false,
            retry_after,
        }
    }

    pub fn is_acquired(&self) -> bool {
        self.acquired
    }
}
