use chrono::Utc;
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame,
};

use taxdesk_core::auth::token;
use taxdesk_core::utils::{format_remaining, format_timestamp, mask_token, truncate_string};

use crate::app::{App, AppState, LoginFocus, Route};

use super::boundary::CaughtFault;
use super::styles;

pub fn render(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Title bar
            Constraint::Min(10),   // Main content
            Constraint::Length(2), // Status bar
        ])
        .split(frame.area());

    render_title_bar(frame, app, chunks[0]);
    render_main_content(frame, app, chunks[1]);
    render_status_bar(frame, app, chunks[2]);

    // Render overlays
    if matches!(app.state, AppState::EnteringPath) {
        render_path_overlay(frame, app);
    }

    if matches!(app.state, AppState::ShowingHelp) {
        render_help_overlay(frame, app);
    }

    if matches!(app.state, AppState::ConfirmingQuit) {
        render_quit_overlay(frame);
    }
}

fn render_title_bar(frame: &mut Frame, app: &App, area: Rect) {
    let title = format!("  taxdesk · {}", app.route.title());
    let help_hint = "[?] Help";

    let title_line = Line::from(vec![
        Span::styled(title.clone(), styles::title_style()),
        Span::raw(" ".repeat(
            (area.width as usize).saturating_sub(title.chars().count() + help_hint.len() + 4),
        )),
        Span::styled(help_hint, styles::muted_style()),
    ]);

    let block = Block::default()
        .borders(Borders::BOTTOM)
        .border_style(styles::muted_style());

    let paragraph = Paragraph::new(title_line).block(block);
    frame.render_widget(paragraph, area);
}

fn render_main_content(frame: &mut Frame, app: &App, area: Rect) {
    match &app.route {
        Route::Login => render_login(frame, app, area),
        Route::Register => render_info_page(frame, area, REGISTER_TEXT),
        Route::ForgotPassword => render_info_page(frame, area, FORGOT_PASSWORD_TEXT),
        Route::Terms => render_info_page(frame, area, TERMS_TEXT),
        Route::Privacy => render_info_page(frame, area, PRIVACY_TEXT),
        // Next loop iteration redirects to login
        _ if !app.can_render_route() => render_info_page(frame, area, SESSION_ENDED_TEXT),
        route => {
            let path = route.path().to_string();
            let rendered = app.boundary.catch(&path, || match route {
                Route::Admin => render_admin(frame, app, area),
                Route::NotFound(path) => render_not_found(frame, path, area),
                _ => render_home(frame, app, area),
            });
            if rendered.is_none() {
                if let Some(fault) = app.boundary.fault() {
                    render_recovery(frame, &fault, area);
                }
            }
        }
    }
}

fn render_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    let shortcuts = match app.route {
        Route::Login => "[Enter] sign in | [Esc] quit",
        Route::Register | Route::ForgotPassword | Route::Terms | Route::Privacy => {
            "[Esc] back | [q]uit"
        }
        _ if app.boundary.has_fault() => "[r]eload | [l]ogin | [q]uit",
        _ => "[g]o to | [x] sign out | [q]uit",
    };

    let left_text = match (&app.status_message, app.session.user()) {
        (Some(msg), _) => format!(" {} ", msg),
        (None, Some(user)) => format!(" {} ({}) ", user.display_name(), user.role.display_name()),
        (None, None) => format!(" {} ", app.session.state().label()),
    };
    let right_text = format!(" {} ", shortcuts);

    let width = area.width as usize;
    let left_text = truncate_string(&left_text, width.saturating_sub(right_text.len()));
    let padding_len = width
        .saturating_sub(left_text.chars().count())
        .saturating_sub(right_text.len());

    let status_line = Line::from(vec![
        Span::styled(left_text, styles::muted_style()),
        Span::raw(" ".repeat(padding_len)),
        Span::styled(right_text, styles::muted_style()),
    ]);
    let paragraph = Paragraph::new(status_line).style(styles::status_bar_style());
    frame.render_widget(paragraph, area);
}

// ============================================================================
// Public screens
// ============================================================================

const REGISTER_TEXT: &[&str] = &[
    "Accounts are created by your office administrator.",
    "",
    "Ask an administrator to invite your email address; the invitation",
    "lets you choose a password and sign in to the console.",
];

const FORGOT_PASSWORD_TEXT: &[&str] = &[
    "Password recovery happens on the web portal.",
    "",
    "Request a reset link with the email you sign in with. Once the new",
    "password is set, come back here and sign in again.",
];

const TERMS_TEXT: &[&str] = &[
    "The console is provided to registered offices for managing their",
    "client registry and PER/DCOMP compensation requests.",
    "",
    "Actions taken in the console are recorded against your account.",
];

const PRIVACY_TEXT: &[&str] = &[
    "Client data shown in the console stays on the office's backend.",
    "",
    "Session tokens are kept in the configured credential store and are",
    "removed when you sign out.",
];

const SESSION_ENDED_TEXT: &[&str] = &["Session ended. Returning to sign in..."];

fn render_info_page(frame: &mut Frame, area: Rect, text: &[&str]) {
    let lines: Vec<Line> = text.iter().map(|line| Line::from(*line)).collect();

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(styles::border_style(false));

    let paragraph = Paragraph::new(lines)
        .block(block)
        .wrap(Wrap { trim: false });
    frame.render_widget(paragraph, area);
}

fn render_login(frame: &mut Frame, app: &App, area: Rect) {
    let height = if app.login_error.is_some() { 14 } else { 12 };
    let area = centered_rect_fixed(52, height, area);

    frame.render_widget(Clear, area);

    let mut lines = vec![
        Line::from(Span::styled("        Taxdesk console", styles::title_style())),
        Line::from(Span::styled(
            "   Client registry · PER/DCOMP tracking",
            styles::muted_style(),
        )),
        Line::from(""),
    ];

    let field = |label: &'static str, value: String, focused: bool| {
        let style = if focused {
            styles::selected_style()
        } else {
            styles::list_item_style()
        };
        let cursor = if focused { "▌" } else { "" };
        Line::from(vec![
            Span::raw("   "),
            Span::styled(label, styles::muted_style()),
            Span::styled(format!("{:<28}{}", value, cursor), style),
            Span::styled("]", styles::muted_style()),
        ])
    };

    let email = truncate_string(&app.login_email, 28);
    lines.push(field("Email:    [", email, app.login_focus == LoginFocus::Email));

    let masked = "*".repeat(app.login_password.chars().count().min(28));
    lines.push(field("Password: [", masked, app.login_focus == LoginFocus::Password));

    let button_focused = app.login_focus == LoginFocus::Button;
    let button_style = if button_focused {
        styles::selected_style()
    } else {
        styles::list_item_style()
    };
    let label = if button_focused { " ▶ Sign in ◀ " } else { "   Sign in   " };
    lines.push(Line::from(""));
    lines.push(Line::from(vec![
        Span::raw("                 ["),
        Span::styled(label, button_style),
        Span::raw("]"),
    ]));

    if let Some(ref error) = app.login_error {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            format!(" {}", truncate_string(error, 48)),
            styles::error_style(),
        )));
    }

    lines.push(Line::from(""));
    lines.push(Line::from(vec![
        Span::styled(" ^R", styles::help_key_style()),
        Span::styled(" register  ", styles::muted_style()),
        Span::styled("^F", styles::help_key_style()),
        Span::styled(" forgot  ", styles::muted_style()),
        Span::styled("^T", styles::help_key_style()),
        Span::styled(" terms  ", styles::muted_style()),
        Span::styled("^P", styles::help_key_style()),
        Span::styled(" privacy", styles::muted_style()),
    ]));

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(styles::border_style(true))
        .style(Style::default());

    frame.render_widget(Paragraph::new(lines).block(block), area);
}

// ============================================================================
// Signed-in screens (drawn inside the error boundary)
// ============================================================================

fn key_value(key: &str, value: String) -> Line<'static> {
    Line::from(vec![
        Span::styled(format!("  {:<20}", key), styles::muted_style()),
        Span::styled(value, styles::list_item_style()),
    ])
}

fn access_expiry_line(access: Option<&str>) -> Line<'static> {
    let value = match access.map(token::decode_expiry) {
        None => "none".to_string(),
        Some(Ok(expires_at)) => format!(
            "{} (in {})",
            format_timestamp(expires_at),
            format_remaining(expires_at - Utc::now())
        ),
        Some(Err(e)) => format!("unreadable: {}", e),
    };
    key_value("Access token expires", value)
}

fn render_home(frame: &mut Frame, app: &App, area: Rect) {
    let session = app.session.session();
    let mut lines = vec![Line::from(Span::styled(" Session", styles::highlight_style()))];

    match session.user {
        Some(ref user) => {
            lines.push(key_value("Name", user.display_name().to_string()));
            lines.push(key_value("Email", user.email.clone()));
            lines.push(key_value("Role", user.role.display_name().to_string()));
        }
        None => lines.push(key_value("User", "profile not loaded ([u] to retry)".to_string())),
    }

    lines.push(key_value("State", app.session.state().label().to_string()));
    lines.push(access_expiry_line(session.access_token.as_deref()));
    lines.push(key_value(
        "Refresh token",
        if session.refresh_token.is_some() { "present" } else { "none" }.to_string(),
    ));
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(" Backend", styles::highlight_style())));
    lines.push(key_value("API", app.api.base_url().to_string()));
    lines.push(key_value(
        "Credential store",
        format!("{:?}", app.config.credential_backend).to_lowercase(),
    ));

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(styles::border_style(true));
    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_admin(frame: &mut Frame, app: &App, area: Rect) {
    let session = app.session.session();
    let timings = app.session.timings();
    let secs = |s: u64| format_remaining(chrono::Duration::seconds(s as i64));

    let lines = vec![
        Line::from(Span::styled(" Tokens", styles::highlight_style())),
        key_value(
            "Access token",
            session.access_token.as_deref().map(mask_token).unwrap_or_else(|| "none".to_string()),
        ),
        access_expiry_line(session.access_token.as_deref()),
        key_value(
            "Refresh token",
            session.refresh_token.as_deref().map(mask_token).unwrap_or_else(|| "none".to_string()),
        ),
        Line::from(""),
        Line::from(Span::styled(" Session timings", styles::highlight_style())),
        key_value("Refresh lookahead", secs(timings.refresh_lookahead_secs)),
        key_value("Poll interval", secs(timings.poll_interval_secs)),
        key_value("Hidden threshold", secs(timings.visibility_threshold_secs)),
        key_value("Idle threshold", secs(timings.idle_focus_threshold_secs)),
        key_value("Access token TTL", secs(timings.access_token_ttl_secs)),
        key_value("Refresh token TTL", secs(timings.refresh_token_ttl_secs)),
        Line::from(""),
        Line::from(vec![
            Span::styled("  [c]", styles::help_key_style()),
            Span::styled(" run a session check now", styles::muted_style()),
        ]),
    ];

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(styles::border_style(true));
    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_not_found(frame: &mut Frame, path: &str, area: Rect) {
    let lines = vec![
        Line::from(Span::styled(
            format!(" Nothing lives at {}", path),
            styles::highlight_style(),
        )),
        Line::from(""),
        Line::from(Span::styled(
            " Press [h] for home or [Esc] to go back.",
            styles::muted_style(),
        )),
    ];
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(styles::border_style(false));
    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_recovery(frame: &mut Frame, fault: &CaughtFault, area: Rect) {
    frame.render_widget(Clear, area);

    let lines = vec![
        Line::from(Span::styled(
            " Something went wrong while drawing this screen.",
            styles::error_style(),
        )),
        Line::from(""),
        key_value("Screen", fault.path.clone()),
        key_value("Error", fault.message.clone()),
        Line::from(""),
        Line::from(vec![
            Span::styled("  [r]", styles::help_key_style()),
            Span::styled(" reload this screen   ", styles::help_desc_style()),
            Span::styled("[l]", styles::help_key_style()),
            Span::styled(" go to login", styles::help_desc_style()),
        ]),
    ];

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(styles::error_style());
    frame.render_widget(
        Paragraph::new(lines).block(block).wrap(Wrap { trim: false }),
        area,
    );
}

// ============================================================================
// Overlays
// ============================================================================

/// Create a centered rectangle with fixed dimensions
fn centered_rect_fixed(width: u16, height: u16, r: Rect) -> Rect {
    let x = r.x + (r.width.saturating_sub(width)) / 2;
    let y = r.y + (r.height.saturating_sub(height)) / 2;
    Rect::new(x, y, width.min(r.width), height.min(r.height))
}

fn render_path_overlay(frame: &mut Frame, app: &App) {
    let area = centered_rect_fixed(52, 3, frame.area());
    frame.render_widget(Clear, area);

    let line = Line::from(vec![
        Span::styled(" Go to: ", styles::muted_style()),
        Span::styled(format!("{}▌", app.path_input), styles::search_style()),
    ]);
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(styles::border_style(true));
    frame.render_widget(Paragraph::new(line).block(block), area);
}

fn render_help_overlay(frame: &mut Frame, _app: &App) {
    let area = centered_rect_fixed(52, 22, frame.area());

    frame.render_widget(Clear, area);

    let version = env!("CARGO_PKG_VERSION");
    let entry = |key: &'static str, desc: &'static str| {
        Line::from(vec![
            Span::styled(format!("  {:<10}", key), styles::help_key_style()),
            Span::styled(desc, styles::help_desc_style()),
        ])
    };

    let help_text = vec![
        Line::from(Span::styled("  Taxdesk console", styles::title_style())),
        Line::from(Span::styled(format!("  version {}", version), styles::muted_style())),
        Line::from(""),
        Line::from(Span::styled(" Navigation", styles::highlight_style())),
        entry("h", "Home"),
        entry("a", "Administration"),
        entry("t / p", "Terms / privacy"),
        entry("g or :", "Go to a path"),
        entry("Esc", "Go back"),
        Line::from(""),
        Line::from(Span::styled(" Session", styles::highlight_style())),
        entry("u", "Reload profile"),
        entry("c", "Check session now"),
        entry("x", "Sign out"),
        entry("q", "Quit"),
        Line::from(""),
        Line::from(vec![
            Span::styled("       Press ", styles::muted_style()),
            Span::styled("?", styles::help_key_style()),
            Span::styled(" or ", styles::muted_style()),
            Span::styled("Esc", styles::help_key_style()),
            Span::styled(" to close", styles::muted_style()),
        ]),
    ];

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(styles::border_style(true))
        .style(Style::default());

    frame.render_widget(Paragraph::new(help_text).block(block), area);
}

fn render_quit_overlay(frame: &mut Frame) {
    let area = centered_rect_fixed(46, 7, frame.area());

    frame.render_widget(Clear, area);

    let lines = vec![
        Line::from(""),
        Line::from(Span::styled(
            "   Are you sure you want to quit?",
            styles::highlight_style(),
        )),
        Line::from(""),
        Line::from(vec![
            Span::styled("   Press ", styles::muted_style()),
            Span::styled("[Y]", styles::help_key_style()),
            Span::styled(" to quit, ", styles::muted_style()),
            Span::styled("[N]", styles::help_key_style()),
            Span::styled(" to cancel", styles::muted_style()),
        ]),
    ];

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(styles::border_style(true))
        .style(Style::default());

    frame.render_widget(Paragraph::new(lines).block(block), area);
}
