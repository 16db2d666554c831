//! Logic-free `{{key}}` substitution. Keys are `[a-z0-9_]+`; anything else between braces is
//! ordinary text, so generated Rust (`{`, `format!("{:?}")`) needs no escaping.
//! A key absent from the view model renders as the literal placeholder.

use crate::metadata::view::ViewModel;

#[derive(Clone, Debug, PartialEq, Eq)]
enum Segment {
    Text(String),
    Slot(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Template {
    segments: Vec<Segment>,
}

fn is_key_char(c: u8) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit() || c == b'_'
}

/// Length of a `{{key}}` slot starting at `at`, if there is one.
fn slot_at(bytes: &[u8], at: usize) -> Option<usize> {
    if !bytes[at..].starts_with(b"{{") {
        return None;
    }
    let start = at + 2;
    let mut end = start;
    while end < bytes.len() && is_key_char(bytes[end]) {
        end += 1;
    }
    if end > start && bytes[end..].starts_with(b"}}") {
        Some(end + 2 - at)
    } else {
        None
    }
}

impl Template {
    pub fn parse(text: &str) -> Template {
        let bytes = text.as_bytes();
        let mut segments = Vec::new();
        let mut text_start = 0;
        let mut i = 0;
        while i < bytes.len() {
            match slot_at(bytes, i) {
                Some(len) => {
                    if text_start < i {
                        segments.push(Segment::Text(text[text_start..i].to_string()));
                    }
                    segments.push(Segment::Slot(text[i + 2..i + len - 2].to_string()));
                    i += len;
                    text_start = i;
                }
                None => i += 1,
            }
        }
        if text_start < bytes.len() {
            segments.push(Segment::Text(text[text_start..].to_string()));
        }
        Template { segments }
    }

    pub fn render(&self, ctx: &ViewModel) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(t) => out.push_str(t),
                Segment::Slot(key) => match ctx.get(key) {
                    Some(v) => out.push_str(v),
                    None => {
                        out.push_str("{{");
                        out.push_str(key);
                        out.push_str("}}");
                    }
                },
            }
        }
        out
    }

    /// Distinct slot keys in first-use order.
    pub fn slots(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = Vec::new();
        for segment in &self.segments {
            if let Segment::Slot(k) = segment {
                if !keys.contains(&k.as_str()) {
                    keys.push(k);
                }
            }
        }
        keys
    }
}
