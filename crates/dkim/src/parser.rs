use nom::bytes::complete::{tag, take_while, take_while1};
use nom::character::complete::satisfy;
use nom::combinator::{opt, recognize};
use nom::multi::fold_many0;
use nom::sequence::{delimited, pair, preceded, terminated};
use nom::{IResult, Parser};

#[derive(Clone, Debug, PartialEq)]
/// DKIM signature tag
pub struct Tag {
    /// Name of the tag (v, i, a, h, ...)
    pub name: String,
    /// Value of the tag with spaces removed
    pub value: String,
    /// Value of the tag as seen in the text
    pub raw_value: String,
}

/// Parse a complete tag list, such as the value of a DKIM-Signature
/// header, as specified by
/// <https://datatracker.ietf.org/doc/html/rfc6376#section-3.2>.
/// Used by the tests to pick apart the headers that the signer emits.
pub fn parse_tag_list(input: &str) -> Result<Vec<Tag>, String> {
    let (remain, tags) = tag_list(input).map_err(|err| format!("{err}"))?;
    if !remain.trim().is_empty() {
        return Err(format!("unexpected trailing data: {remain:?}"));
    }
    Ok(tags)
}

/// tag-list  =  tag-spec *( ";" tag-spec ) [ ";" ]
fn tag_list(input: &str) -> IResult<&str, Vec<Tag>> {
    let (input, start) = tag_spec(input)?;

    terminated(
        fold_many0(
            preceded(tag(";"), tag_spec),
            move || vec![start.clone()],
            |mut acc: Vec<Tag>, item| {
                acc.push(item);
                acc
            },
        ),
        opt(tag(";")),
    )
    .parse(input)
}

/// tag-spec  =  [FWS] tag-name [FWS] "=" [FWS] tag-value [FWS]
fn tag_spec(input: &str) -> IResult<&str, Tag> {
    let (input, name) = delimited(opt(fws), tag_name, opt(fws)).parse(input)?;
    let (input, _) = tag("=").parse(input)?;

    // Parse the twice to keep the original text
    let value_input = input;
    let (_, raw_value) = delimited(opt(fws), raw_tag_value, opt(fws)).parse(value_input)?;
    let (input, value) = delimited(opt(fws), tag_value, opt(fws)).parse(value_input)?;

    Ok((
        input,
        Tag {
            name: name.to_owned(),
            value,
            raw_value,
        },
    ))
}

/// tag-name  =  ALPHA *ALNUMPUNC
/// ALNUMPUNC =  ALPHA / DIGIT / "_"
fn tag_name(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        satisfy(|c: char| c.is_ascii_alphabetic()),
        take_while(|c: char| c.is_ascii_alphanumeric() || c == '_'),
    ))
    .parse(input)
}

/// VALCHAR   =  %x21-3A / %x3C-7E
fn is_valchar(c: char) -> bool {
    matches!(c, '!'..=':' | '<'..='~')
}

/// tag-value =  [ tval *( 1*(WSP / FWS) tval ) ]
/// tval      =  1*VALCHAR
fn tag_value(input: &str) -> IResult<&str, String> {
    match opt(take_while1(is_valchar)).parse(input)? {
        (input, Some(start)) => fold_many0(
            preceded(fws, take_while1(is_valchar)),
            || start.to_owned(),
            |mut acc: String, item| {
                acc += item;
                acc
            },
        )
        .parse(input),
        (input, None) => Ok((input, "".to_string())),
    }
}

fn raw_tag_value(input: &str) -> IResult<&str, String> {
    match opt(take_while1(is_valchar)).parse(input)? {
        (input, Some(start)) => fold_many0(
            pair(fws, take_while1(is_valchar)),
            || start.to_owned(),
            |mut acc: String, (ws, item)| {
                acc.push_str(ws);
                acc.push_str(item);
                acc
            },
        )
        .parse(input),
        (input, None) => Ok((input, "".to_string())),
    }
}

/// FWS is folding whitespace.  It allows multiple lines separated by
/// CRLF followed by at least one whitespace, to be joined.
fn fws(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c == ' ' || c == '\t' || c == '\r' || c == '\n').parse(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(name: &str, value: &str, raw: &str) -> Tag {
        Tag {
            name: name.to_string(),
            value: value.to_string(),
            raw_value: raw.to_string(),
        }
    }

    #[test]
    fn test_tag_list() {
        k9::assert_equal!(
            parse_tag_list("a = a/1@.-:= ").unwrap(),
            vec![tag("a", "a/1@.-:=", "a/1@.-:=")]
        );
        k9::assert_equal!(
            parse_tag_list("a= b ; c=d;").unwrap(),
            vec![tag("a", "b", "b"), tag("c", "d", "d")]
        );
        k9::assert_equal!(
            parse_tag_list("bh=AAA\r\n\tBBB; b=;").unwrap(),
            vec![tag("bh", "AAABBB", "AAA\r\n\tBBB"), tag("b", "", "")]
        );
    }

    #[test]
    fn test_tag_list_errors() {
        assert!(parse_tag_list("=nope").is_err());
        assert!(parse_tag_list("a=b;;c=d").is_err());
    }
}
