use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Node};

static WS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").unwrap_or_else(|err| panic!("ws regex: {err}")));
static OUTER_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^<([a-zA-Z][a-zA-Z0-9]*)>.*</([a-zA-Z][a-zA-Z0-9]*)>$")
        .unwrap_or_else(|err| panic!("outer tag regex: {err}"))
});

/// Text content of `fragment` with entities decoded and whitespace runs
/// collapsed into single spaces. `<br>` counts as a space.
pub fn strip_markup(fragment: &str) -> String {
    let parsed = Html::parse_fragment(fragment);
    let mut text = String::with_capacity(fragment.len());
    for node in parsed.root_element().descendants() {
        match node.value() {
            Node::Text(t) => text.push_str(t),
            Node::Element(el) if el.name() == "br" => text.push(' '),
            _ => {}
        }
    }
    WS_RE.replace_all(&text, " ").trim().to_owned()
}

/// Name of the element wrapping the whole fragment, e.g. `p` for `<p>..</p>`.
pub fn outer_tag(fragment: &str) -> Option<&str> {
    let caps = OUTER_TAG_RE.captures(fragment.trim())?;
    let open = caps.get(1)?.as_str();
    let close = caps.get(2)?.as_str();
    (open == close).then_some(open)
}

/// Puts plain translated text back into the outer element of `original`.
pub fn rewrap(original: &str, plain: &str) -> String {
    match outer_tag(original) {
        Some(tag) => format!("<{tag}>{}</{tag}>", escape_text(plain)),
        None => plain.to_owned(),
    }
}

pub fn escape_text(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
