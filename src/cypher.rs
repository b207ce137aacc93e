//! Lexical helpers for inspecting Cypher text
//!
//! Only what the safety and schema checks need; this is not a parser.

/// Replace the contents of string literals and comments with spaces.
///
/// Byte offsets and line structure are preserved so later matches still
/// line up with the original text.
pub fn mask_literals(query: &str) -> String {
    let mut out = String::with_capacity(query.len());
    let mut chars = query.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' | '`' => {
                let quote = c;
                out.push(quote);
                while let Some(inner) = chars.next() {
                    if inner == '\\' && quote != '`' {
                        out.push(' ');
                        if let Some(escaped) = chars.next() {
                            push_blank(&mut out, escaped);
                        }
                        continue;
                    }
                    if inner == quote {
                        out.push(quote);
                        break;
                    }
                    push_blank(&mut out, inner);
                }
            }
            '/' if chars.peek() == Some(&'/') => {
                push_blank(&mut out, c);
                while let Some(&next) = chars.peek() {
                    if next == '\n' {
                        break;
                    }
                    push_blank(&mut out, next);
                    chars.next();
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                push_blank(&mut out, c);
                let mut prev = '\0';
                for inner in chars.by_ref() {
                    push_blank(&mut out, inner);
                    if prev == '*' && inner == '/' {
                        break;
                    }
                    prev = inner;
                }
            }
            _ => out.push(c),
        }
    }

    out
}

fn push_blank(out: &mut String, c: char) {
    if c == '\n' {
        out.push('\n');
    } else {
        for _ in 0..c.len_utf8() {
            out.push(' ');
        }
    }
}
