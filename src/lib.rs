//! Workspace facade crate.
//!
//! Re-exports the streaming engine, its runtime infrastructure and the host
//! bridge contracts so applications can depend on `pcm-stream-workspace`
//! alone. The `desktop-shims` feature (default) also pulls in the
//! `reqwest`-backed range fetcher and lets `CoreConfig` use it by default.

pub use bridge_traits;
pub use core_playback;
pub use core_runtime;

#[cfg(feature = "desktop-shims")]
pub use bridge_desktop;
