use crate::{HeaderConfig, HeaderError, HeaderField, HeaderValue, Mailbox, Result};
use chrono::{DateTime, FixedOffset};
use indexmap::IndexMap;

/// The operations that a DKIM signer, or anything else that needs
/// to observe and extend a message's headers, relies upon.
pub trait HeaderSet {
    /// The names of all headers, in the order that they will be rendered
    fn list_all(&self) -> Vec<&str>;

    fn has(&self, name: &str) -> bool;

    /// All instances of `name`, in insertion order
    fn get_all(&self, name: &str) -> &[HeaderField];

    fn add_text_header(&mut self, name: &str, value: &str) -> Result<()>;

    /// Add a header whose value is emitted without any further
    /// encoding or folding
    fn add_raw_header(&mut self, name: &str, value: &str) -> Result<()>;
}

/// An ordered collection of header fields.
///
/// Headers render in the order established by `define_ordering`,
/// with all others following in insertion order.
#[derive(Debug, Clone, Default)]
pub struct SimpleHeaderSet {
    headers: IndexMap<String, Vec<HeaderField>>,
    order: Vec<String>,
    always_display: Vec<String>,
    config: HeaderConfig,
}

impl SimpleHeaderSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: HeaderConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &HeaderConfig {
        &self.config
    }

    fn add(&mut self, name: &str, value: HeaderValue) -> Result<&mut HeaderField> {
        let field = HeaderField::new(name, value, &self.config)?;
        tracing::trace!("add {:?} header {name}", field.kind());
        let fields = self.headers.entry(name.to_ascii_lowercase()).or_default();
        fields.push(field);
        let idx = fields.len() - 1;
        Ok(&mut fields[idx])
    }

    pub fn add_mailbox_header<M: Into<Mailbox>>(
        &mut self,
        name: &str,
        mailboxes: impl IntoIterator<Item = M>,
    ) -> Result<&mut HeaderField> {
        let map = mailboxes
            .into_iter()
            .map(|m| {
                let m = m.into();
                (m.address, m.name)
            })
            .collect();
        self.add(name, HeaderValue::Mailboxes(map))
    }

    pub fn add_date_header(
        &mut self,
        name: &str,
        date: DateTime<FixedOffset>,
    ) -> Result<&mut HeaderField> {
        self.add(name, HeaderValue::Date(date))
    }

    pub fn add_id_header<S: Into<String>>(
        &mut self,
        name: &str,
        ids: impl IntoIterator<Item = S>,
    ) -> Result<&mut HeaderField> {
        self.add(name, HeaderValue::Ids(ids.into_iter().map(Into::into).collect()))
    }

    pub fn add_path_header(&mut self, name: &str, path: Option<&str>) -> Result<&mut HeaderField> {
        self.add(name, HeaderValue::Path(path.map(|s| s.to_string())))
    }

    pub fn add_parameterized_header<K: Into<String>, V: Into<String>>(
        &mut self,
        name: &str,
        value: &str,
        parameters: impl IntoIterator<Item = (K, V)>,
    ) -> Result<&mut HeaderField> {
        self.add(
            name,
            HeaderValue::Parameterized {
                value: value.to_string(),
                parameters: parameters
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            },
        )
    }

    /// The first instance of `name`
    pub fn get(&self, name: &str) -> Option<&HeaderField> {
        self.get_all(name).first()
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut HeaderField> {
        self.get_all_mut(name).first_mut()
    }

    pub fn get_all_mut(&mut self, name: &str) -> &mut [HeaderField] {
        match self.headers.get_mut(&name.to_ascii_lowercase()) {
            Some(fields) => fields,
            None => &mut [],
        }
    }

    /// Remove every instance of `name`, returning what was removed
    pub fn remove_all(&mut self, name: &str) -> Vec<HeaderField> {
        self.headers
            .shift_remove(&name.to_ascii_lowercase())
            .unwrap_or_default()
    }

    /// Headers named here render first, in this order
    pub fn define_ordering<S: AsRef<str>>(&mut self, names: impl IntoIterator<Item = S>) {
        self.order = names
            .into_iter()
            .map(|n| n.as_ref().to_ascii_lowercase())
            .collect();
    }

    /// Headers named here render even when their body is empty
    pub fn set_always_display<S: AsRef<str>>(&mut self, names: impl IntoIterator<Item = S>) {
        self.always_display = names
            .into_iter()
            .map(|n| n.as_ref().to_ascii_lowercase())
            .collect();
    }

    /// Change the charset of this set and of every header in it
    pub fn set_charset(&mut self, charset: &str) -> Result<()> {
        for field in self.headers.values_mut().flatten() {
            field.set_charset(charset)?;
        }
        self.config.charset = charset.to_string();
        Ok(())
    }

    fn rank(&self, key: &str) -> usize {
        self.order
            .iter()
            .position(|n| n == key)
            .unwrap_or(self.order.len())
    }

    fn ordered(&self) -> Vec<(&String, &Vec<HeaderField>)> {
        let mut entries: Vec<_> = self.headers.iter().collect();
        // stable, so unranked headers retain insertion order
        entries.sort_by_key(|(key, _)| self.rank(key));
        entries
    }

    /// Render every non-empty (or always-displayed) header
    pub fn to_header_string(&self) -> Result<String> {
        let mut result = String::new();
        for (key, fields) in self.ordered() {
            let always = self.always_display.contains(key);
            for field in fields {
                if always || !field.body()?.is_empty() {
                    result.push_str(&field.to_header_string()?);
                }
            }
        }
        Ok(result)
    }
}

impl HeaderSet for SimpleHeaderSet {
    fn list_all(&self) -> Vec<&str> {
        self.ordered()
            .into_iter()
            .filter_map(|(_, fields)| fields.first().map(|f| f.name()))
            .collect()
    }

    fn has(&self, name: &str) -> bool {
        !self.get_all(name).is_empty()
    }

    fn get_all(&self, name: &str) -> &[HeaderField] {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(|v| v.as_slice())
            .unwrap_or_default()
    }

    fn add_text_header(&mut self, name: &str, value: &str) -> Result<()> {
        self.add(name, HeaderValue::Text(value.to_string()))?;
        Ok(())
    }

    fn add_raw_header(&mut self, name: &str, value: &str) -> Result<()> {
        if !is_folded(value) {
            return Err(HeaderError::compliance(
                name,
                "raw value contains a line break that is not folding whitespace",
            ));
        }
        self.add(name, HeaderValue::Raw(value.to_string()))?;
        Ok(())
    }
}

/// Every line break is CRLF followed by folding whitespace
fn is_folded(value: &str) -> bool {
    let bytes = value.as_bytes();
    bytes.iter().enumerate().all(|(idx, &b)| match b {
        b'\r' => bytes.get(idx + 1) == Some(&b'\n'),
        b'\n' => {
            idx > 0
                && bytes[idx - 1] == b'\r'
                && matches!(bytes.get(idx + 1), Some(b' ' | b'\t'))
        }
        _ => true,
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn scenario_mailbox() {
        let mut headers = SimpleHeaderSet::new();
        headers
            .add_mailbox_header("From", [("chris@swiftmailer.org", "Chris Corbyn")])
            .unwrap();
        k9::assert_equal!(
            headers.to_header_string().unwrap(),
            "From: Chris Corbyn <chris@swiftmailer.org>\r\n"
        );
    }

    #[test]
    fn scenario_content_type() {
        let mut headers = SimpleHeaderSet::new();
        headers
            .add_parameterized_header("Content-Type", "text/plain", [("charset", "utf-8")])
            .unwrap();
        k9::assert_equal!(
            headers.to_header_string().unwrap(),
            "Content-Type: text/plain; charset=utf-8\r\n"
        );
    }

    #[test]
    fn case_insensitive_lookup() {
        let mut headers = SimpleHeaderSet::new();
        headers.add_text_header("X-Foo", "one").unwrap();
        headers.add_text_header("x-foo", "two").unwrap();
        assert!(headers.has("X-FOO"));
        k9::assert_equal!(headers.get_all("x-FoO").len(), 2);
        k9::assert_equal!(headers.get("x-foo").unwrap().text(), Some("one"));
        k9::assert_equal!(headers.list_all(), vec!["X-Foo"]);
        k9::assert_equal!(
            headers.to_header_string().unwrap(),
            "X-Foo: one\r\nx-foo: two\r\n"
        );
        k9::assert_equal!(headers.remove_all("X-foo").len(), 2);
        assert!(!headers.has("x-foo"));
        assert!(headers.get_all("x-foo").is_empty());
    }

    #[test]
    fn ordering() {
        let mut headers = SimpleHeaderSet::new();
        headers.add_text_header("X-Later", "1").unwrap();
        headers.add_text_header("Subject", "hello").unwrap();
        headers.add_id_header("Message-ID", ["a@b"]).unwrap();
        headers.add_text_header("X-Last", "2").unwrap();
        headers.define_ordering(["message-id", "Subject"]);
        k9::assert_equal!(
            headers.list_all(),
            vec!["Message-ID", "Subject", "X-Later", "X-Last"]
        );
        k9::assert_equal!(
            headers.to_header_string().unwrap(),
            "Message-ID: <a@b>\r\nSubject: hello\r\nX-Later: 1\r\nX-Last: 2\r\n"
        );
    }

    #[test]
    fn empty_headers_are_hidden() {
        let mut headers = SimpleHeaderSet::new();
        headers.add_text_header("Subject", "").unwrap();
        headers.add_text_header("X-Empty", "").unwrap();
        headers.set_always_display(["subject"]);
        k9::assert_equal!(headers.to_header_string().unwrap(), "Subject: \r\n");
    }

    #[test]
    fn charset_propagates() {
        let mut headers = SimpleHeaderSet::new();
        headers.add_text_header("Subject", "café").unwrap();
        headers.set_charset("iso-8859-1").unwrap();
        k9::assert_equal!(headers.get("subject").unwrap().charset(), "iso-8859-1");
        headers.add_text_header("X-Other", "x").unwrap();
        k9::assert_equal!(headers.get("x-other").unwrap().charset(), "iso-8859-1");
        assert!(headers.set_charset("no-such-charset").is_err());
    }

    #[test]
    fn rendering_is_idempotent() {
        let mut headers = SimpleHeaderSet::new();
        headers.add_text_header("Subject", &"word ".repeat(40)).unwrap();
        let first = headers.to_header_string().unwrap();
        k9::assert_equal!(headers.to_header_string().unwrap(), first);
        for line in first.trim_end().split("\r\n") {
            assert!(line.len() <= 78, "{line}");
        }

        headers
            .get_mut("subject")
            .unwrap()
            .set_value(HeaderValue::Text("short".into()))
            .unwrap();
        k9::assert_equal!(headers.to_header_string().unwrap(), "Subject: short\r\n");
    }

    #[test]
    fn raw_headers() {
        let mut headers = SimpleHeaderSet::new();
        headers.add_raw_header("X-Raw", "a;\r\n\tb").unwrap();
        k9::assert_equal!(headers.to_header_string().unwrap(), "X-Raw: a;\r\n\tb\r\n");
        assert!(headers.add_raw_header("X-Bad", "a\nb").is_err());
        assert!(headers.add_raw_header("X-Bad", "a\r\nb").is_err());
        assert!(headers.add_raw_header("X-Bad", "a\r\n").is_err());
    }
}
