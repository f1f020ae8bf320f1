//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `RangeFetcher` using `reqwest` with rustls
//!
//! `Clock` already has a portable implementation in `bridge-traits`
//! (`SystemClock`); hosts bring their own `LoggerSink`.
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::ReqwestRangeFetcher;
//! use bridge_traits::{ByteRange, RangeFetcher};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let fetcher = ReqwestRangeFetcher::new()?;
//!     let header = fetcher
//!         .fetch_range("https://cdn.example.com/track.wav", ByteRange::new(0, 44))
//!         .await?;
//!     println!("{} bytes", header.len());
//!     Ok(())
//! }
//! ```

mod http;

pub use http::ReqwestRangeFetcher;
