use once_cell::sync::Lazy;
use regex::Regex;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("email pattern")
});

static PHONE_NOISE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^0-9+\-\s]").expect("phone pattern"));

/// Trim and HTML-escape free text before it is stored.
pub fn sanitize_input(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.trim().chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Lowercased address, or `None` when it does not look like an email.
pub fn sanitize_email(email: &str) -> Option<String> {
    let email = email.trim().to_lowercase();
    EMAIL_RE.is_match(&email).then_some(email)
}

pub fn sanitize_phone(phone: &str) -> String {
    PHONE_NOISE_RE.replace_all(phone, "").trim().to_string()
}

/// Only absolute http(s) URLs are kept.
pub fn sanitize_url(url: &str) -> Option<String> {
    let url = url.trim();
    (url.starts_with("http://") || url.starts_with("https://")).then(|| url.to_string())
}
