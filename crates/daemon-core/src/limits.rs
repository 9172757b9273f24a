//! The two POSIX limit queries the rest of the crate needs.
//!
//! Both queries fall back to a usable constant when the underlying system
//! reports "indeterminate", matching the original `lim(3)` module's
//! `_SC_OPEN_MAX`/`_PC_PATH_MAX` fallbacks of 1024 and 4096.

use nix::unistd::{PathconfVar, SysconfVar, pathconf, sysconf};

/// Used when the system cannot report a maximum open-file-descriptor count.
pub const OPEN_MAX_FALLBACK: u64 = 1024;

/// Used when the system cannot report a maximum path length.
pub const PATH_MAX_FALLBACK: u64 = 4096;

/// Returns the maximum number of open file descriptors this process may
/// hold, falling back to [`OPEN_MAX_FALLBACK`] when the system cannot say.
#[must_use]
pub fn max_open_files() -> u64 {
    match sysconf(SysconfVar::OPEN_MAX) {
        Ok(Some(limit)) if limit > 0 => limit.unsigned_abs(),
        _ => OPEN_MAX_FALLBACK,
    }
}

/// Returns the maximum path length usable under `/`, falling back to
/// [`PATH_MAX_FALLBACK`] when the system cannot say.
#[must_use]
pub fn max_path_len() -> u64 {
    match pathconf("/", PathconfVar::PATH_MAX) {
        Ok(Some(limit)) if limit > 0 => limit.unsigned_abs(),
        _ => PATH_MAX_FALLBACK,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_open_files_is_usable() {
        assert!(max_open_files() > 0);
    }

    #[test]
    fn max_path_len_is_usable() {
        assert!(max_path_len() > 0);
    }
}
