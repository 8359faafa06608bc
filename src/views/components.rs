//! Stateless presentation fragments shared by the pages.

use super::escape_html;
use crate::i18n::Dictionary;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Success,
    Danger,
    Warning,
    Neutral,
}

impl Tone {
    pub fn class(&self) -> &'static str {
        match self {
            Tone::Success => "tone-success",
            Tone::Danger => "tone-danger",
            Tone::Warning => "tone-warning",
            Tone::Neutral => "tone-neutral",
        }
    }
}

/// Colour for a project, service or activity status.
pub fn status_tone(status: &str) -> Tone {
    match status {
        "running" | "active" | "success" => Tone::Success,
        "error" => Tone::Danger,
        "pending" | "stopped" | "inactive" => Tone::Warning,
        _ => Tone::Neutral,
    }
}

pub fn badge(status: &str) -> String {
    format!(
        r#"<span class="badge {}">{}</span>"#,
        status_tone(status).class(),
        escape_html(status)
    )
}

/// `body` is trusted markup.
pub fn card(title: &str, body: &str) -> String {
    format!(
        r#"<section class="card"><h2>{}</h2>{}</section>"#,
        escape_html(title),
        body
    )
}

pub fn stat_card(title: &str, value: &str, detail: &str) -> String {
    format!(
        r#"<div class="stat"><h3>{}</h3><p class="value">{}</p><p class="detail">{}</p></div>"#,
        escape_html(title),
        escape_html(value),
        escape_html(detail)
    )
}

pub fn stat_grid(cards: &[String]) -> String {
    format!(r#"<div class="stats">{}</div>"#, cards.concat())
}

/// Header cells are escaped; row cells are trusted markup.
pub fn table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let head = headers
        .iter()
        .map(|h| format!("<th>{}</th>", escape_html(h)))
        .collect::<String>();
    let body = rows
        .iter()
        .map(|row| {
            let cells = row
                .iter()
                .map(|c| format!("<td>{}</td>", c))
                .collect::<String>();
            format!("<tr>{}</tr>", cells)
        })
        .collect::<String>();
    format!(
        "<table><thead><tr>{}</tr></thead><tbody>{}</tbody></table>",
        head, body
    )
}

pub fn empty_state(message: &str) -> String {
    format!(r#"<p class="empty">{}</p>"#, escape_html(message))
}

pub fn error_card(title: &str, body: &str) -> String {
    format!(
        r#"<section class="card error" role="alert"><h2>{}</h2><p>{}</p></section>"#,
        escape_html(title),
        escape_html(body)
    )
}

pub fn access_denied(dict: &Dictionary) -> String {
    error_card(dict.access_denied_title, dict.access_denied_body)
}

/// A list of rows, or the empty-state message when there are none.
pub fn table_or_empty(headers: &[&str], rows: &[Vec<String>], empty: &str) -> String {
    if rows.is_empty() {
        empty_state(empty)
    } else {
        table(headers, rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::i18n::EN;

    #[test]
    fn test_status_tones() {
        assert_eq!(status_tone("running"), Tone::Success);
        assert_eq!(status_tone("active"), Tone::Success);
        assert_eq!(status_tone("success"), Tone::Success);
        assert_eq!(status_tone("error"), Tone::Danger);
        assert_eq!(status_tone("pending"), Tone::Warning);
        assert_eq!(status_tone("stopped"), Tone::Warning);
        assert_eq!(status_tone("archived"), Tone::Neutral);
        assert_eq!(status_tone("whatever"), Tone::Neutral);
    }

    #[test]
    fn test_badge_escapes_status() {
        let html = badge("<b>");
        assert!(html.contains("&lt;b&gt;"));
        assert!(html.contains("tone-neutral"));
    }

    #[test]
    fn test_table_or_empty() {
        assert!(table_or_empty(&["Name"], &[], "Nothing").contains("Nothing"));
        let html = table_or_empty(&["Name"], &[vec!["<em>x</em>".to_string()]], "Nothing");
        assert!(html.contains("<th>Name</th>"));
        assert!(html.contains("<td><em>x</em></td>"));
    }

    #[test]
    fn test_access_denied_uses_dictionary() {
        let html = access_denied(&EN);
        assert!(html.contains("Access denied"));
        assert!(html.contains(r#"role="alert""#));
    }
}
