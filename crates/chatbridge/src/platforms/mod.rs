//! Platform drivers adapting a live desktop session to the crate's
//! [`crate::bridge::DesktopDriver`] and [`crate::node::UiNode`] surfaces.
//!
//! Only macOS is implemented today; the target application of record ships
//! there. Other platforms get a driver by implementing the same two traits.

#[cfg(target_os = "macos")]
pub mod macos;

#[cfg(target_os = "macos")]
pub use macos::MacOsDriver;
