//! Library surface behind the `supervisord` binary: the CLI definition,
//! the fork/exec/wait child lifecycle, and the unified error type, split
//! out of `main.rs` so `build.rs` can `#[path]`-include [`cli`] for manual
//! page generation and so integration tests can exercise [`child`]
//! directly.

pub mod child;
pub mod cli;
pub mod errors;
pub mod telemetry;
