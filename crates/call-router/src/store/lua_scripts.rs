//! Lua scripts for atomic shared-store operations.
//!
//! The lock manager's correctness depends on these being atomic:
//! a release or renewal must observe the holder token and mutate the
//! key in one step, so a holder whose lock expired and was re-acquired
//! by another instance can never delete or extend the new holder's
//! lock.

/// Lua script for compare-and-delete.
///
/// Arguments:
/// - KEYS[1]: Key to delete (e.g., `lock:call:{id}`)
/// - ARGV[1]: Expected current value (holder token)
///
/// Returns:
/// - 1: Deleted (value matched)
/// - 0: Not deleted (key absent or owned by someone else)
pub const COMPARE_AND_DELETE: &str = r#"
local current = redis.call('GET', KEYS[1])

if current == ARGV[1] then
    redis.call('DEL', KEYS[1])
    return 1
else
    return 0
end
"#;

/// Lua script for compare-and-expire (lock renewal).
///
/// Arguments:
/// - KEYS[1]: Key to renew (e.g., `lock:call:{id}`)
/// - ARGV[1]: Expected current value (holder token)
/// - ARGV[2]: New TTL in milliseconds
///
/// Returns:
/// - 1: TTL reset (value matched)
/// - 0: Not renewed (key absent or owned by someone else)
pub const COMPARE_AND_EXPIRE: &str = r#"
local current = redis.call('GET', KEYS[1])

if current == ARGV[1] then
    redis.call('PEXPIRE', KEYS[1], ARGV[2])
    return 1
else
    return 0
end
"#;
