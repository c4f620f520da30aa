//! Keyboard input handling for the TUI.
//!
//! This module handles all keyboard events and translates them into
//! application state changes.

use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use taxdesk_core::guard;

use crate::app::{
    can_add_email_char, can_add_password_char, can_add_path_char, App, AppState, LoginFocus,
    Route,
};

use super::boundary::RecoveryAction;

/// Handle keyboard input. Returns true if the app should quit.
pub async fn handle_input(app: &mut App, key: KeyEvent) -> Result<bool> {
    // Handle help overlay
    if matches!(app.state, AppState::ShowingHelp) {
        if matches!(key.code, KeyCode::Esc | KeyCode::Char('?') | KeyCode::Char('q')) {
            app.state = AppState::Normal;
        }
        return Ok(false);
    }

    // Handle quit confirmation
    if matches!(app.state, AppState::ConfirmingQuit) {
        match key.code {
            KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter => {
                app.state = AppState::Quitting;
                return Ok(true);
            }
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                app.state = AppState::Normal;
            }
            _ => {}
        }
        return Ok(false);
    }

    if matches!(app.state, AppState::EnteringPath) {
        handle_path_input(app, key);
        return Ok(false);
    }

    match app.route {
        Route::Login => handle_login_input(app, key).await,
        Route::Register | Route::ForgotPassword | Route::Terms | Route::Privacy => {
            handle_public_page_input(app, key);
            Ok(false)
        }
        Route::Home | Route::Admin | Route::NotFound(_) => handle_console_input(app, key).await,
    }
}

fn handle_path_input(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.state = AppState::Normal;
            app.path_input.clear();
        }
        KeyCode::Enter => {
            app.state = AppState::Normal;
            let path = std::mem::take(&mut app.path_input);
            if !path.is_empty() {
                let path = if path.starts_with('/') { path } else { format!("/{}", path) };
                app.navigate(&path);
            }
        }
        KeyCode::Backspace => {
            app.path_input.pop();
        }
        KeyCode::Char(c) => {
            if can_add_path_char(app.path_input.chars().count(), c) {
                app.path_input.push(c);
            }
        }
        _ => {}
    }
}

async fn handle_login_input(app: &mut App, key: KeyEvent) -> Result<bool> {
    // Links to the other public screens
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        match key.code {
            KeyCode::Char('r') => app.navigate(guard::REGISTER),
            KeyCode::Char('f') => app.navigate(guard::FORGOT_PASSWORD),
            KeyCode::Char('t') => app.navigate(guard::TERMS),
            KeyCode::Char('p') => app.navigate(guard::PRIVACY),
            _ => {}
        }
        return Ok(false);
    }

    match key.code {
        KeyCode::Esc => {
            // Quit if on login screen
            app.state = AppState::Quitting;
            return Ok(true);
        }
        KeyCode::Down | KeyCode::Tab => {
            app.login_focus = match app.login_focus {
                LoginFocus::Email => LoginFocus::Password,
                LoginFocus::Password => LoginFocus::Button,
                LoginFocus::Button => LoginFocus::Email,
            };
        }
        KeyCode::Up | KeyCode::BackTab => {
            app.login_focus = match app.login_focus {
                LoginFocus::Email => LoginFocus::Button,
                LoginFocus::Password => LoginFocus::Email,
                LoginFocus::Button => LoginFocus::Password,
            };
        }
        KeyCode::Enter => match app.login_focus {
            LoginFocus::Email => app.login_focus = LoginFocus::Password,
            LoginFocus::Password | LoginFocus::Button => {
                // On failure login_error is set and the form stays up
                let _ = app.attempt_login().await;
            }
        },
        KeyCode::Backspace => match app.login_focus {
            LoginFocus::Email => {
                app.login_email.pop();
            }
            LoginFocus::Password => {
                app.login_password.pop();
            }
            LoginFocus::Button => {}
        },
        KeyCode::Char(c) => match app.login_focus {
            LoginFocus::Email => {
                if can_add_email_char(app.login_email.chars().count(), c) {
                    app.login_email.push(c);
                }
            }
            LoginFocus::Password => {
                if can_add_password_char(app.login_password.chars().count(), c) {
                    app.login_password.push(c);
                }
            }
            LoginFocus::Button => {}
        },
        _ => {}
    }
    Ok(false)
}

fn handle_public_page_input(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc | KeyCode::Backspace | KeyCode::Char('b') => {
            if app.can_go_back() {
                app.go_back();
            } else {
                app.replace(guard::LOGIN);
            }
        }
        KeyCode::Char('q') => app.state = AppState::ConfirmingQuit,
        KeyCode::Char('?') => app.state = AppState::ShowingHelp,
        _ => {}
    }
}

async fn handle_console_input(app: &mut App, key: KeyEvent) -> Result<bool> {
    // The recovery view takes over the screen until an action is picked
    if app.boundary.has_fault() {
        match key.code {
            KeyCode::Char('r') => app.recover(RecoveryAction::Reload),
            KeyCode::Char('l') => app.recover(RecoveryAction::GoToLogin),
            KeyCode::Char('q') => app.state = AppState::ConfirmingQuit,
            _ => {}
        }
        return Ok(false);
    }

    match key.code {
        KeyCode::Char('q') => app.state = AppState::ConfirmingQuit,
        KeyCode::Char('?') => app.state = AppState::ShowingHelp,
        KeyCode::Char('g') | KeyCode::Char(':') => {
            app.path_input.clear();
            app.state = AppState::EnteringPath;
        }
        KeyCode::Char('h') => app.navigate(guard::HOME),
        KeyCode::Char('a') => app.navigate(guard::ADMIN),
        KeyCode::Char('t') => app.navigate(guard::TERMS),
        KeyCode::Char('p') => app.navigate(guard::PRIVACY),
        KeyCode::Char('u') => app.reload_profile_background(),
        KeyCode::Char('c') => {
            let check = app.session.check_token_validity().await;
            app.status_message = Some(format!("Session check: {:?}", check));
        }
        KeyCode::Char('x') => app.logout().await,
        KeyCode::Esc | KeyCode::Backspace => {
            app.go_back();
        }
        _ => {}
    }
    Ok(false)
}
