//! Splits a shell input line into arguments.

/// Split `line` on single spaces, honoring `'...'` and `"..."` spans.
///
/// Consecutive spaces yield empty tokens. A token starting with a quote
/// opens a span that runs, space-joined, until a token ending with the same
/// quote; the quotes are stripped. A single token that opens and closes
/// with the same quote (`"abc"`) is a complete span by itself, so it does
/// not swallow the following words. A span left open at end of line becomes
/// the last token. There is no escaping.
pub fn tokenize(line: &str) -> Vec<String> {
    if line.is_empty() {
        return Vec::new();
    }

    let mut tokens = Vec::new();
    let mut open: Option<(char, String)> = None;

    for word in line.split(' ') {
        match open.take() {
            None => match opening_quote(word) {
                Some(quote) => {
                    let rest = &word[1..];
                    if rest.ends_with(quote) {
                        tokens.push(rest[..rest.len() - 1].to_string());
                    } else {
                        open = Some((quote, rest.to_string()));
                    }
                }
                None => tokens.push(word.to_string()),
            },
            Some((quote, mut span)) => {
                span.push(' ');
                match word.strip_suffix(quote) {
                    Some(last) => {
                        span.push_str(last);
                        tokens.push(span);
                    }
                    None => {
                        span.push_str(word);
                        open = Some((quote, span));
                    }
                }
            }
        }
    }

    if let Some((_, span)) = open {
        tokens.push(span);
    }
    tokens
}

fn opening_quote(word: &str) -> Option<char> {
    match word.chars().next() {
        Some(c @ ('\'' | '"')) => Some(c),
        _ => None,
    }
}
