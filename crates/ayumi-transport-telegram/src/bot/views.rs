//! View layer for pagination controls
//!
//! Renders navigation controls as inline keyboards and parses the callback
//! payloads they produce.

use ayumi_core::reply::{NavControl, NavDirection, Reply};
use ayumi_core::session::SessionHandle;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

// ─────────────────────────────────────────────────────────────────────────────
// Callback constants
// ─────────────────────────────────────────────────────────────────────────────

/// Prefix of every pagination callback payload
pub const PAGE_CALLBACK_PREFIX: &str = "pg";
/// Callback data for inert buttons (page indicator, disabled arrows)
pub const PAGE_CALLBACK_NOOP: &str = "pg:noop";

/// Decoded pagination callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageCallback {
    /// Turn a page of a session.
    Navigate {
        /// Session to drive.
        handle: SessionHandle,
        /// Which way to turn.
        direction: NavDirection,
    },
    /// Inert button; only needs an answer.
    Noop,
}

/// Callback payload of a control.
#[must_use]
pub fn callback_data(control: &NavControl) -> String {
    if control.enabled {
        format!(
            "{PAGE_CALLBACK_PREFIX}:{}:{}",
            control.handle,
            control.direction.as_str()
        )
    } else {
        PAGE_CALLBACK_NOOP.to_string()
    }
}

/// Parse a callback payload. Returns `None` for payloads that are not ours.
#[must_use]
pub fn parse_callback(data: &str) -> Option<PageCallback> {
    if data == PAGE_CALLBACK_NOOP {
        return Some(PageCallback::Noop);
    }
    let mut parts = data.split(':');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(PAGE_CALLBACK_PREFIX), Some(handle), Some(direction), None) => {
            Some(PageCallback::Navigate {
                handle: handle.parse().ok()?,
                direction: NavDirection::parse(direction)?,
            })
        }
        _ => None,
    }
}

fn arrow(control: &NavControl) -> &'static str {
    match (control.direction, control.enabled) {
        (NavDirection::Previous, true) => "◀️",
        (NavDirection::Next, true) => "▶️",
        (_, false) => "·",
    }
}

/// Inline keyboard for a reply: previous, page indicator, next.
///
/// Returns `None` for replies without controls.
#[must_use]
pub fn page_keyboard(reply: &Reply) -> Option<InlineKeyboardMarkup> {
    if !reply.is_interactive() {
        return None;
    }

    let mut row: Vec<InlineKeyboardButton> = Vec::with_capacity(reply.controls.len() + 1);
    for control in &reply.controls {
        if control.direction == NavDirection::Next {
            if let Some(indicator) = &reply.indicator {
                row.push(InlineKeyboardButton::callback(indicator.clone(), PAGE_CALLBACK_NOOP));
            }
        }
        row.push(InlineKeyboardButton::callback(arrow(control), callback_data(control)));
    }

    Some(InlineKeyboardMarkup::new(vec![row]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ayumi_core::session::render_page;

    fn pages(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("page {i}")).collect()
    }

    fn payloads(markup: &InlineKeyboardMarkup) -> Vec<String> {
        markup.inline_keyboard[0]
            .iter()
            .map(|button| match &button.kind {
                teloxide::types::InlineKeyboardButtonKind::CallbackData(data) => data.clone(),
                other => panic!("unexpected button kind {other:?}"),
            })
            .collect()
    }

    #[test]
    fn test_first_page_disables_previous() {
        let handle = SessionHandle::new();
        let markup = page_keyboard(&render_page(handle, &pages(3), 0, true)).expect("keyboard");

        let data = payloads(&markup);
        assert_eq!(data.len(), 3);
        assert_eq!(data[0], PAGE_CALLBACK_NOOP);
        assert_eq!(data[1], PAGE_CALLBACK_NOOP);
        assert_eq!(data[2], format!("pg:{handle}:next"));
        assert_eq!(markup.inline_keyboard[0][1].text, "1/3");
    }

    #[test]
    fn test_expired_page_has_no_keyboard() {
        let reply = render_page(SessionHandle::new(), &pages(3), 1, false);
        assert!(page_keyboard(&reply).is_none());
    }

    #[test]
    fn test_payload_round_trip_and_size() {
        let handle = SessionHandle::new();
        let control = NavControl {
            handle,
            direction: NavDirection::Previous,
            enabled: true,
        };
        let data = callback_data(&control);
        // Telegram caps callback data at 64 bytes
        assert!(data.len() <= 64);
        assert_eq!(
            parse_callback(&data),
            Some(PageCallback::Navigate {
                handle,
                direction: NavDirection::Previous
            })
        );
    }

    #[test]
    fn test_foreign_payloads_are_ignored() {
        assert_eq!(parse_callback(PAGE_CALLBACK_NOOP), Some(PageCallback::Noop));
        assert_eq!(parse_callback("retry_no_loop"), None);
        assert_eq!(parse_callback("pg:not-a-uuid:next"), None);
        assert_eq!(parse_callback(&format!("pg:{}:up", SessionHandle::new())), None);
        assert_eq!(parse_callback(&format!("pg:{}:next:x", SessionHandle::new())), None);
    }
}
