//! Server-rendered HTML pages.
//!
//! Views are plain functions from data to markup. They never touch the store
//! or the session; handlers fetch first and render last.

pub mod components;

use axum::response::Html;

use crate::i18n::Locale;

pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Everything the shared layout needs besides the page body.
pub struct Page<'a> {
    pub locale: Locale,
    pub title: &'a str,
    /// Display name of the signed-in user, if any.
    pub signed_in_as: Option<&'a str>,
    /// Path without the locale prefix, used by the language switcher.
    pub path: &'a str,
}

fn nav(page: &Page<'_>) -> String {
    let dict = page.locale.dict();
    let lang = page.locale;

    let switcher = Locale::ALL
        .iter()
        .filter(|l| **l != lang)
        .map(|l| {
            format!(
                r#"<a href="{}" hreflang="{}">{}</a>"#,
                l.path(page.path),
                l.as_str(),
                l.as_str().to_uppercase()
            )
        })
        .collect::<Vec<_>>()
        .join(" ");

    let account = match page.signed_in_as {
        Some(name) => format!(
            concat!(
                r#"<a href="{dashboard}">Dashboard</a> "#,
                r#"<a href="{billing}">{billing_label}</a> "#,
                r#"<a href="{profile}">{profile_label}</a> "#,
                r#"<span class="signed-in">{signed_in_as} {name}</span> "#,
                r#"<form method="post" action="{logout}" class="inline">"#,
                r#"<button type="submit">{sign_out}</button></form>"#
            ),
            dashboard = lang.path("/dashboard"),
            billing = lang.path("/dashboard/billing"),
            billing_label = dict.billing_title,
            profile = lang.path("/profile"),
            profile_label = dict.profile_title,
            signed_in_as = dict.signed_in_as,
            name = escape_html(name),
            logout = lang.path("/logout"),
            sign_out = dict.sign_out,
        ),
        None => format!(r#"<a href="{}">{}</a>"#, lang.path("/login"), dict.sign_in),
    };

    format!(
        r#"<nav><a href="{}" class="brand">{}</a> {} {}</nav>"#,
        lang.path("/"),
        dict.app_name,
        account,
        switcher
    )
}

/// Wrap a body in the document shell.
pub fn render(page: Page<'_>, body: &str) -> Html<String> {
    let dict = page.locale.dict();
    Html(format!(
        concat!(
            "<!DOCTYPE html>\n",
            r#"<html lang="{lang}"><head><meta charset="utf-8">"#,
            r#"<meta name="viewport" content="width=device-width, initial-scale=1">"#,
            "<title>{title} | {app}</title></head>",
            "<body>{nav}<main>{body}</main></body></html>"
        ),
        lang = page.locale.as_str(),
        title = escape_html(page.title),
        app = dict.app_name,
        nav = nav(&page),
        body = body,
    ))
}
