//! Newtypes for identifiers that would otherwise all be bare integers

use std::fmt;

/// Process ID of the traced application (the debuggee)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pid(pub u32);

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PID:{}", self.0)
    }
}

impl Pid {
    /// Whether `/proc/<pid>` still exists
    #[must_use]
    pub fn is_alive(self) -> bool {
        std::path::Path::new(&format!("/proc/{}", self.0)).exists()
    }
}

/// Sequence number of a request on the native debug transport.
///
/// Unique per live connection, strictly increasing, restarting at 1 after
/// the bridge returns to Disabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SeqId(pub u64);

impl fmt::Display for SeqId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "seq#{}", self.0)
    }
}

/// Connected observer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(pub u64);

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Observer#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Pid(42).to_string(), "PID:42");
        assert_eq!(SeqId(3).to_string(), "seq#3");
        assert_eq!(ObserverId(1).to_string(), "Observer#1");
    }

    #[test]
    fn test_own_process_is_alive() {
        #[cfg(target_os = "linux")]
        assert!(Pid(std::process::id()).is_alive());
    }
}
