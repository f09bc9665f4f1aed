//! Emoticon substitution for outgoing message text
//!
//! Pure string rewrite applied to each message before it is recorded and
//! relayed: known word tokens are replaced with their ASCII glyphs. Matching
//! is case-sensitive and positional: the text is scanned left to right, at
//! each position the table is tried in order and the first matching token
//! wins, then scanning resumes after the inserted glyph (replacements are
//! never re-expanded).

/// Token-to-glyph substitution table, tried in order at each position
const EMOTICONS: &[(&str, &str)] = &[
    ("smile", ":)"),
    ("laugh", ":D"),
    ("wink", ";)"),
    ("sad", ":("),
    ("cry", ":'("),
    ("heart", "<3"),
];

/// Replace every known emoticon token in `text` with its glyph
pub fn substitute(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    'scan: while !rest.is_empty() {
        for (token, glyph) in EMOTICONS {
            if let Some(tail) = rest.strip_prefix(token) {
                out.push_str(glyph);
                rest = tail;
                continue 'scan;
            }
        }
        let ch = rest.chars().next().unwrap();
        out.push(ch);
        rest = &rest[ch.len_utf8()..];
    }

    out
}
