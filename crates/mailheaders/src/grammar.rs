//! Just enough of the RFC 5322 grammar to validate the values that
//! we are asked to emit.
use nom::branch::alt;
use nom::bytes::complete::{take_while, take_while1};
use nom::character::complete::{char, satisfy};
use nom::combinator::{all_consuming, recognize};
use nom::multi::many0;
use nom::sequence::{delimited, separated_pair};
use nom::{IResult, Parser};

fn is_atext(c: char) -> bool {
    match c {
        '!' | '#' | '$' | '%' | '&' | '\'' | '*' | '+' | '-' | '/' | '=' | '?' | '^' | '_'
        | '`' | '{' | '|' | '}' | '~' => true,
        c => c.is_ascii_alphanumeric() || !c.is_ascii(),
    }
}

// qtext = %d33 / %d35-91 / %d93-126 / UTF8-non-ascii
fn is_qtext(c: char) -> bool {
    matches!(c, '\u{21}' | '\u{23}'..='\u{5b}' | '\u{5d}'..='\u{7e}') || !c.is_ascii()
}

// dtext = %d33-90 / %d94-126
fn is_dtext(c: char) -> bool {
    matches!(c, '\u{21}'..='\u{5a}' | '\u{5e}'..='\u{7e}')
}

fn is_wsp(c: char) -> bool {
    c == ' ' || c == '\t'
}

fn atext(input: &str) -> IResult<&str, &str> {
    take_while1(is_atext).parse(input)
}

fn dot_atom_text(input: &str) -> IResult<&str, &str> {
    recognize((atext, many0((char('.'), atext)))).parse(input)
}

fn quoted_pair(input: &str) -> IResult<&str, &str> {
    recognize((
        char('\\'),
        satisfy(|c: char| is_wsp(c) || matches!(c, '\u{21}'..='\u{7e}')),
    ))
    .parse(input)
}

fn quoted_string(input: &str) -> IResult<&str, &str> {
    recognize(delimited(
        char('"'),
        many0(alt((take_while1(|c: char| is_qtext(c) || is_wsp(c)), quoted_pair))),
        char('"'),
    ))
    .parse(input)
}

fn domain_literal(input: &str) -> IResult<&str, &str> {
    recognize((char('['), take_while(is_dtext), char(']'))).parse(input)
}

fn addr_spec(input: &str) -> IResult<&str, &str> {
    recognize(separated_pair(
        alt((dot_atom_text, quoted_string)),
        char('@'),
        alt((dot_atom_text, domain_literal)),
    ))
    .parse(input)
}

// obs-phrase permits "." between words
fn word(input: &str) -> IResult<&str, &str> {
    alt((
        take_while1(|c: char| is_atext(c) || c == '.'),
        quoted_string,
    ))
    .parse(input)
}

fn phrase(input: &str) -> IResult<&str, &str> {
    recognize((word, many0((take_while1(is_wsp), word)))).parse(input)
}

/// Returns true if `s` is an RFC 5322 addr-spec
pub fn is_addr_spec(s: &str) -> bool {
    all_consuming(addr_spec).parse(s).is_ok()
}

/// Returns true if `s` is a valid msg-id, without the angle brackets
pub fn is_msg_id(s: &str) -> bool {
    // id-left and id-right are the same productions as the two
    // halves of an addr-spec once the obsolete forms are included
    is_addr_spec(s)
}

/// Returns true if `s` can be used as a display name without quoting
pub fn is_phrase(s: &str) -> bool {
    s.is_ascii() && all_consuming(phrase).parse(s).is_ok()
}

/// RFC 2045 token characters
pub fn is_mime_token_char(b: u8) -> bool {
    matches!(
        b,
        0x21 | 0x23..=0x27 | 0x2a | 0x2b | 0x2d | 0x2e | 0x30..=0x39 | 0x41..=0x5a | 0x5e..=0x7e
    )
}

pub fn is_mime_token(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(is_mime_token_char)
}

/// ASCII other than TAB, CR and LF; such text can be represented
/// in a quoted-string
pub(crate) fn is_quotable(s: &str) -> bool {
    s.bytes()
        .all(|b| matches!(b, 0x00..=0x08 | 0x0b | 0x0c | 0x0e..=0x7f))
}

/// Bytes which require a word to be RFC 2047 encoded
pub(crate) fn needs_encoding(s: &str) -> bool {
    s.bytes()
        .any(|b| matches!(b, 0x00..=0x08 | 0x0a..=0x1f | 0x7f..=0xff))
}

/// Wrap `s` in double quotes, escaping backslash and double quote
pub(crate) fn quote_string(s: &str) -> String {
    let mut result = String::with_capacity(s.len() + 2);
    result.push('"');
    for c in s.chars() {
        if c == '"' || c == '\\' {
            result.push('\\');
        }
        result.push(c);
    }
    result.push('"');
    result
}
