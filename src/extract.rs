//! Recovery of the caller-relevant payload from free-form model output.
//! Models regularly wrap code in markdown fences or echo the language name
//! even when told not to; every caller goes through here instead of trusting
//! the raw text.

use regex::Regex;
use std::sync::OnceLock;

fn fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // Opening marker may carry a language tag; body is non-greedy so the
        // first block wins.
        Regex::new(r"(?s)```[a-zA-Z0-9_+\-]*[ \t]*\n(.*?)```").expect("fence pattern")
    })
}

/// Return the trimmed body of the first fenced block, or the trimmed raw
/// text when no fence is present. When `target_language` is given, a
/// post-pass additionally strips a leading language-name echo and leading
/// hash-header lines.
pub fn extract_payload(raw: &str, target_language: Option<&str>) -> String {
    let body = match fence_re().captures(raw) {
        Some(caps) => caps[1].trim().to_string(),
        None => raw.trim().to_string(),
    };
    match target_language {
        Some(lang) => strip_leading_headers(&strip_language_echo(&body, lang)),
        None => body,
    }
}

/// Drop a first line that merely repeats the language name, e.g. a "rust"
/// echo left over from a fence tag the model mangled.
fn strip_language_echo(text: &str, language: &str) -> String {
    let lower = language.to_lowercase();
    if let Some((first, rest)) = text.split_once('\n') {
        if first.trim().to_lowercase() == lower {
            return rest.trim_start_matches('\n').to_string();
        }
    }
    text.to_string()
}

/// Strip leading `#`-prefixed header lines ("# Converted code:" and the
/// like). Stops at the first real line so in-code comments survive.
fn strip_leading_headers(text: &str) -> String {
    let mut rest = text;
    loop {
        let Some((first, tail)) = rest.split_once('\n') else {
            return rest.trim().to_string();
        };
        let trimmed = first.trim_start();
        if trimmed.starts_with('#') && !trimmed.starts_with("#!") {
            rest = tail;
        } else {
            return rest.trim().to_string();
        }
    }
}
