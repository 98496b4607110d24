use mailencoding::{Base64HeaderEncoder, HeaderEncoder, QpHeaderEncoder};
use serde::Deserialize;

/// Which RFC 2047 encoding to use for header text that cannot be
/// represented literally.
#[derive(Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HeaderEncoding {
    #[default]
    #[serde(alias = "q")]
    Q,
    #[serde(alias = "b")]
    B,
}

impl HeaderEncoding {
    pub fn encoder(&self) -> &'static dyn HeaderEncoder {
        match self {
            Self::Q => &QpHeaderEncoder,
            Self::B => &Base64HeaderEncoder,
        }
    }
}

/// Settings applied to newly created header fields
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct HeaderConfig {
    #[serde(default = "HeaderConfig::default_charset")]
    pub charset: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default = "HeaderConfig::default_max_line_length")]
    pub max_line_length: usize,
    #[serde(default)]
    pub encoding: HeaderEncoding,
    /// Use RFC 2231 to encode parameter values that need it.  When
    /// disabled, RFC 2047 encoded-words are used instead, which is
    /// not standard but is understood by some older clients.
    #[serde(default = "HeaderConfig::default_rfc2231")]
    pub rfc2231_parameters: bool,
}

impl HeaderConfig {
    fn default_charset() -> String {
        "utf-8".to_string()
    }

    fn default_max_line_length() -> usize {
        78
    }

    fn default_rfc2231() -> bool {
        true
    }
}

impl Default for HeaderConfig {
    fn default() -> Self {
        Self {
            charset: Self::default_charset(),
            language: None,
            max_line_length: Self::default_max_line_length(),
            encoding: HeaderEncoding::default(),
            rfc2231_parameters: Self::default_rfc2231(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults() {
        let config: HeaderConfig = serde_json::from_str("{}").unwrap();
        k9::assert_equal!(config, HeaderConfig::default());
        k9::assert_equal!(config.max_line_length, 78);
        k9::assert_equal!(config.charset, "utf-8");
    }

    #[test]
    fn overrides() {
        let config: HeaderConfig = serde_json::from_str(
            r#"{"charset": "iso-8859-1", "encoding": "B", "language": "en", "rfc2231_parameters": false}"#,
        )
        .unwrap();
        k9::assert_equal!(config.encoding, HeaderEncoding::B);
        k9::assert_equal!(config.encoding.encoder().name(), "B");
        k9::assert_equal!(config.language.as_deref(), Some("en"));
        assert!(!config.rfc2231_parameters);

        assert!(serde_json::from_str::<HeaderConfig>(r#"{"bogus": 1}"#).is_err());
    }
}
