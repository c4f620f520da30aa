//! Terminal UI module using ratatui.
//!
//! This module provides the TUI rendering and input handling:
//!
//! - `render`: Main frame rendering and layout, one view per route
//! - `input`: Keyboard event handling
//! - `boundary`: Error boundary around the signed-in screens
//! - `styles`: Color schemes and text styling

pub mod boundary;
pub mod input;
pub mod render;
pub mod styles;
