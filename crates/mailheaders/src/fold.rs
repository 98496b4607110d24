use crate::grammar::needs_encoding;

/// Split `s` immediately before each SP or HT, so that every piece
/// after the first carries its own leading whitespace
pub(crate) fn split_before_whitespace(s: &str) -> Vec<&str> {
    let mut result = vec![];
    let mut start = 0;
    for (idx, c) in s.char_indices() {
        if idx > start && (c == ' ' || c == '\t') {
            result.push(&s[start..idx]);
            start = idx;
        }
    }
    if start < s.len() {
        result.push(&s[start..]);
    }
    result
}

/// Split into words, merging adjacent words that need encoding so
/// that they become a single run of encoded-words
pub(crate) fn encodable_word_tokens(s: &str) -> Vec<&str> {
    let mut tokens = vec![];
    let mut run: Option<(usize, usize)> = None;
    let base = s.as_ptr() as usize;

    for word in split_before_whitespace(s) {
        let start = word.as_ptr() as usize - base;
        let end = start + word.len();
        if needs_encoding(word) {
            run = Some(match run {
                Some((run_start, _)) => (run_start, end),
                None => (start, end),
            });
        } else {
            if let Some((run_start, run_end)) = run.take() {
                tokens.push(&s[run_start..run_end]);
            }
            tokens.push(word);
        }
    }
    if let Some((run_start, run_end)) = run {
        tokens.push(&s[run_start..run_end]);
    }
    tokens
}

/// Break a field body into the atoms that folding operates on:
/// first before every SP/HT, then around every embedded CRLF, which
/// is kept as a token of its own.  A run of whitespace is joined to
/// the word that follows it so that no line can end on it.
fn fold_tokens(body: &str) -> Vec<&str> {
    let mut atoms = vec![];
    for piece in split_before_whitespace(body) {
        let mut rest = piece;
        while let Some(pos) = rest.find("\r\n") {
            if pos > 0 {
                atoms.push(&rest[..pos]);
            }
            atoms.push("\r\n");
            rest = &rest[pos + 2..];
        }
        if !rest.is_empty() {
            atoms.push(rest);
        }
    }

    let base = body.as_ptr() as usize;
    let offset = |atom: &str| atom.as_ptr() as usize - base;
    let mut tokens = vec![];
    let mut blank: Option<usize> = None;
    for atom in atoms {
        if atom == "\r\n" {
            if let Some(start) = blank.take() {
                tokens.push(&body[start..offset(atom)]);
            }
            tokens.push(atom);
        } else if atom.trim_matches([' ', '\t']).is_empty() {
            blank.get_or_insert(offset(atom));
        } else {
            let start = blank.take().unwrap_or_else(|| offset(atom));
            tokens.push(&body[start..offset(atom) + atom.len()]);
        }
    }
    if let Some(start) = blank {
        tokens.push(&body[start..]);
    }
    tokens
}

/// Produce `name: body` folded to `max_line_length`, terminated by CRLF.
///
/// Tokens are appended to the current line while they fit; an
/// embedded CRLF always starts a new line, and a continuation line
/// always starts with whitespace.
pub(crate) fn fold(name: &str, body: &str, max_line_length: usize) -> String {
    let mut lines: Vec<String> = vec![];
    let mut current = format!("{name}: ");

    for (idx, token) in fold_tokens(body).into_iter().enumerate() {
        if token == "\r\n" {
            if !current.trim().is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            continue;
        }
        if idx > 0 && !current.is_empty() && current.len() + token.len() > max_line_length {
            lines.push(std::mem::take(&mut current));
        }
        if current.is_empty() && !token.starts_with([' ', '\t']) {
            current.push(' ');
        }
        current.push_str(token);
    }
    lines.push(current);

    let mut result = lines.join("\r\n");
    result.push_str("\r\n");
    result
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn whitespace_split() {
        k9::assert_equal!(
            split_before_whitespace("a b\t c"),
            vec!["a", " b", "\t", " c"]
        );
        k9::assert_equal!(split_before_whitespace(" a"), vec![" a"]);
        k9::assert_equal!(split_before_whitespace(""), Vec::<&str>::new());
    }

    #[test]
    fn encodable_runs() {
        k9::assert_equal!(
            encodable_word_tokens("plain wörds äre here"),
            vec!["plain", " wörds äre", " here"]
        );
        k9::assert_equal!(encodable_word_tokens("ü"), vec!["ü"]);
    }

    #[test]
    fn short_values_are_not_folded() {
        k9::assert_equal!(fold("Subject", "hello there", 78), "Subject: hello there\r\n");
    }

    #[test]
    fn folds_before_whitespace() {
        let body = "This is a long subject line which will certainly need to be folded \
                    at least once because it is long";
        let folded = fold("Subject", body, 78);
        k9::assert_equal!(
            folded,
            "Subject: This is a long subject line which will certainly need to be folded at\r\n \
             least once because it is long\r\n"
        );
        for line in folded.trim_end().split("\r\n") {
            assert!(line.len() <= 78);
            assert!(!line.ends_with(' '));
        }
        // unfolding restores the value
        k9::assert_equal!(
            folded.trim_end().replace("\r\n", ""),
            format!("Subject: {body}")
        );
    }

    #[test]
    fn embedded_crlf_forces_break() {
        k9::assert_equal!(
            fold("X", "=?utf-8?Q?a?=\r\n =?utf-8?Q?b?=", 78),
            "X: =?utf-8?Q?a?=\r\n =?utf-8?Q?b?=\r\n"
        );
        k9::assert_equal!(fold("X", "a;\r\nb", 78), "X: a;\r\n b\r\n");
    }

    #[test]
    fn whitespace_runs_stay_with_the_next_word() {
        let body = format!("{}  {}", "x".repeat(60), "y".repeat(10));
        let folded = fold("Subject", &body, 78);
        k9::assert_equal!(
            folded,
            format!("Subject: {}\r\n  {}\r\n", "x".repeat(60), "y".repeat(10))
        );
        for line in folded.trim_end().split("\r\n") {
            assert!(!line.ends_with([' ', '\t']), "{line:?}");
        }
        k9::assert_equal!(
            folded.trim_end().replace("\r\n", ""),
            format!("Subject: {body}")
        );

        k9::assert_equal!(fold_tokens("a \t b"), vec!["a", " \t b"]);
        k9::assert_equal!(fold_tokens("a  \r\n b"), vec!["a", "  ", "\r\n", " b"]);
    }

    #[test]
    fn long_words_overflow() {
        let word = "x".repeat(100);
        k9::assert_equal!(
            fold("X", &format!("{word} y"), 78),
            format!("X: {word}\r\n y\r\n")
        );
    }
}
