/// A transformation applied to bytes as they are committed to a
/// [FilterableInputStream](crate::FilterableInputStream).
pub trait StreamFilter {
    /// Returns true if `buffer` ends in a way that the filter cannot
    /// yet make a decision about, and more bytes should be collected
    /// before committing.
    fn should_buffer(&self, buffer: &[u8]) -> bool;

    /// Transform `bytes`
    fn filter(&self, bytes: &[u8]) -> Vec<u8>;
}

/// Replaces occurrences of byte sequences with other byte sequences.
/// When several search sequences match at the same position, the one
/// registered first wins.
#[derive(Debug, Clone)]
pub struct ReplacementFilter {
    replacements: Vec<(Vec<u8>, Vec<u8>)>,
}

impl ReplacementFilter {
    pub fn new(replacements: Vec<(Vec<u8>, Vec<u8>)>) -> Self {
        let replacements = replacements
            .into_iter()
            .filter(|(search, _)| !search.is_empty())
            .collect();
        Self { replacements }
    }
}

impl StreamFilter for ReplacementFilter {
    fn should_buffer(&self, buffer: &[u8]) -> bool {
        self.replacements.iter().any(|(search, _)| {
            (1..search.len()).any(|len| buffer.ends_with(&search[..len]))
        })
    }

    fn filter(&self, bytes: &[u8]) -> Vec<u8> {
        let mut result = Vec::with_capacity(bytes.len());
        let mut idx = 0;
        'next: while idx < bytes.len() {
            for (search, replace) in &self.replacements {
                if bytes[idx..].starts_with(search) {
                    result.extend_from_slice(replace);
                    idx += search.len();
                    continue 'next;
                }
            }
            result.push(bytes[idx]);
            idx += 1;
        }
        result
    }
}

/// Canonicalizes line endings so that every bare CR and every bare LF
/// becomes CRLF.  A buffer ending in CR is held back, because the
/// following write may begin with the matching LF.
#[derive(Debug, Clone, Copy, Default)]
pub struct CrlfFilter;

impl StreamFilter for CrlfFilter {
    fn should_buffer(&self, buffer: &[u8]) -> bool {
        buffer.last() == Some(&b'\r')
    }

    fn filter(&self, data: &[u8]) -> Vec<u8> {
        let mut normalized = Vec::with_capacity(data.len());
        let mut last_idx = 0;

        for i in memchr::memchr2_iter(b'\r', b'\n', data) {
            match data[i] {
                b'\r' => {
                    normalized.extend_from_slice(&data[last_idx..=i]);
                    if data.get(i + 1).copied() != Some(b'\n') {
                        normalized.push(b'\n');
                    }
                }
                _ => {
                    normalized.extend_from_slice(&data[last_idx..i]);
                    if i == 0 || data[i - 1] != b'\r' {
                        normalized.push(b'\r');
                    }
                    normalized.push(b'\n');
                }
            }
            last_idx = i + 1;
        }

        normalized.extend_from_slice(&data[last_idx..]);
        normalized
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn replacement() {
        let filter = ReplacementFilter::new(vec![
            (b"\r\n".to_vec(), b"\n".to_vec()),
            (b"a".to_vec(), b"AA".to_vec()),
        ]);
        k9::assert_equal!(filter.filter(b"a\r\nb"), b"AA\nb".to_vec());
        assert!(filter.should_buffer(b"foo\r"));
        assert!(!filter.should_buffer(b"foo\r\n"));
        assert!(!filter.should_buffer(b"foo"));
    }

    #[test]
    fn crlf() {
        let filter = CrlfFilter;
        k9::assert_equal!(filter.filter(b"a\nb\rc\r\nd"), b"a\r\nb\r\nc\r\nd".to_vec());
        k9::assert_equal!(filter.filter(b"\n\n"), b"\r\n\r\n".to_vec());
        assert!(filter.should_buffer(b"abc\r"));
        assert!(!filter.should_buffer(b"abc\r\n"));
    }
}
