//! Environment variables the agent writes into the proxy's environment at
//! spawn. The proxy's CLI reads the same names.

pub const FRONTEND_PORT: &str = "CALLSCOPE_FRONTEND_PORT";
pub const IPC_SOCKET_PATH: &str = "CALLSCOPE_IPC_SOCKET_PATH";
pub const HOSTNAME: &str = "CALLSCOPE_HOSTNAME";
pub const MAX_AGE: &str = "CALLSCOPE_MAX_AGE";
pub const USE_CONTEXT: &str = "CALLSCOPE_USE_CONTEXT";
pub const DEBUGGER_PORT: &str = "CALLSCOPE_DEBUGGER_PORT";
pub const DEBUGGEE_PID: &str = "CALLSCOPE_DEBUGGEE_PID";
pub const ENABLE_DEBUGGER: &str = "CALLSCOPE_ENABLE_DEBUGGER";
pub const ARCHIVE_DIR: &str = "CALLSCOPE_ARCHIVE_DIR";

/// Every variable written at spawn, in a stable order
pub const ALL: [&str; 9] = [
    FRONTEND_PORT,
    IPC_SOCKET_PATH,
    HOSTNAME,
    MAX_AGE,
    USE_CONTEXT,
    DEBUGGER_PORT,
    DEBUGGEE_PID,
    ENABLE_DEBUGGER,
    ARCHIVE_DIR,
];

pub const DEFAULT_FRONTEND_PORT: u16 = 6788;
pub const DEFAULT_IPC_SOCKET_PATH: &str = "/tmp/callscope.sock";
pub const DEFAULT_MAX_AGE: u32 = 15;
pub const DEFAULT_DEBUGGER_PORT: u16 = 5858;

/// `"null"`, `"undefined"` and the empty string mean "not set"
#[must_use]
pub fn is_unset(value: &str) -> bool {
    matches!(value.trim(), "" | "null" | "undefined")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_markers() {
        assert!(is_unset("null"));
        assert!(is_unset("undefined"));
        assert!(is_unset(" "));
        assert!(!is_unset("0"));
    }
}
