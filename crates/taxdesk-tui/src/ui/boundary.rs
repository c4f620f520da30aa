//! Render-failure containment for the signed-in screens.
//!
//! A panic raised while drawing a screen inside the boundary is caught,
//! logged and remembered. Until the user picks a recovery action the
//! boundary keeps showing the recovery view instead of re-running the
//! failed render.

use std::any::Any;
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};

use tracing::error;

/// What the user chose on the recovery view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Render the current screen again
    Reload,
    /// Sign out and return to the login screen
    GoToLogin,
}

/// A render failure caught by the boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaughtFault {
    pub path: String,
    pub message: String,
}

/// Rendering takes `&App`, so the fault slot uses interior mutability.
#[derive(Debug, Default)]
pub struct ErrorBoundary {
    fault: RefCell<Option<CaughtFault>>,
}

impl ErrorBoundary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `render` for the screen at `path`. Returns `None` when it
    /// panicked now or an earlier fault has not been cleared yet.
    pub fn catch<R>(&self, path: &str, render: impl FnOnce() -> R) -> Option<R> {
        if self.has_fault() {
            return None;
        }

        match panic::catch_unwind(AssertUnwindSafe(render)) {
            Ok(result) => Some(result),
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(path, message = %message, "Render failure caught");
                *self.fault.borrow_mut() = Some(CaughtFault {
                    path: path.to_string(),
                    message,
                });
                None
            }
        }
    }

    pub fn has_fault(&self) -> bool {
        self.fault.borrow().is_some()
    }

    pub fn fault(&self) -> Option<CaughtFault> {
        self.fault.borrow().clone()
    }

    pub fn reset(&self) {
        self.fault.borrow_mut().take();
    }
}

/// Best-effort text of a panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
