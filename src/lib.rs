//! # suear - MJPEG bridge for Suear Wi-Fi cameras
//!
//! Suear otoscope/endoscope cameras push JPEG frames over UDP in small
//! numbered chunks once asked to over a command port. This crate provides:
//! - The command protocol (start video, device info)
//! - Chunk reassembly into complete JPEG frames on a background thread
//! - A shared, reference-counted video session for any number of viewers
//! - An HTTP server exposing the feed as `multipart/x-mixed-replace`
//!
//! ## Quick Start
//! ```no_run
//! use suear::{BridgeConfig, StreamSession};
//!
//! let session = StreamSession::new(BridgeConfig::default());
//! let viewer = session.attach().unwrap();
//! if let Some(frame) = viewer.session().latest() {
//!     println!("frame {}: {} bytes", frame.index, frame.data.len());
//! }
//! ```

pub mod error;
pub mod types;
pub mod protocol;
pub mod config;
pub mod command;
pub mod frame;
pub mod pool;
pub mod reader;
pub mod session;
pub mod mjpeg;
pub mod server;

#[cfg(test)]
mod testing;

pub use error::SuearError;
pub use types::*;
pub use config::BridgeConfig;
pub use command::{CommandChannel, CommandResponse, SequenceCounter};
pub use session::{LatestFrame, StreamSession, Viewer};
pub use mjpeg::StreamHandler;
pub use server::MirrorServer;

/// Result type alias for suear operations.
pub type Result<T> = std::result::Result<T, SuearError>;
