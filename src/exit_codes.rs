//! Exit code constants for the rackshare CLI.
//!
//! - 0: Success
//! - 1: User error (bad args, invalid config)
//! - 2: Storage failure (unreadable or malformed queue file)
//! - 3: Network or command protocol failure
//! - 4: Lock acquisition failure (mutex file contention)
//! - 5: Arbiter misuse (releasing a resource that is not held)
//! - 6: Timed out waiting in the queue

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// User error: bad arguments or invalid configuration.
pub const USER_ERROR: i32 = 1;

/// Storage failure: queue file missing or malformed.
pub const STORAGE_FAILURE: i32 = 2;

/// Network or protocol failure talking to a peer.
pub const NETWORK_FAILURE: i32 = 3;

/// Lock acquisition failure: the mutex file could not be created in time.
pub const LOCK_FAILURE: i32 = 4;

/// Arbiter misuse, e.g. releasing a resource held by someone else.
pub const ARBITER_FAILURE: i32 = 5;

/// The caller gave up waiting for the resource.
pub const WAIT_TIMEOUT: i32 = 6;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct() {
        let codes = [
            SUCCESS,
            USER_ERROR,
            STORAGE_FAILURE,
            NETWORK_FAILURE,
            LOCK_FAILURE,
            ARBITER_FAILURE,
            WAIT_TIMEOUT,
        ];
        for (i, &a) in codes.iter().enumerate() {
            for (j, &b) in codes.iter().enumerate() {
                if i != j {
                    assert_ne!(a, b, "Exit codes must be distinct");
                }
            }
        }
    }

    #[test]
    fn success_is_zero() {
        assert_eq!(SUCCESS, 0);
    }
}
