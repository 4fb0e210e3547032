//! Caller filter state: the ordered key/value pairs of the current request and
//! the urls produced by adding or removing one pair.

use url::form_urlencoded;

pub trait FilterState: Send + Sync {
    fn pairs(&self) -> &[(String, String)];
    /// Url for the current state with `(key, value)` appended.
    fn with_added(&self, key: &str, value: &str) -> String;
    /// Url for the current state without any pair equal to `(key, value)`.
    fn with_removed(&self, key: &str, value: &str) -> String;

    fn contains(&self, key: &str, value: &str) -> bool {
        self.pairs().iter().any(|(k, v)| k == key && v == value)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryString {
    path: String,
    pairs: Vec<(String, String)>,
}

impl QueryString {
    pub fn new(path: &str, pairs: Vec<(String, String)>) -> Self {
        Self { path: path.to_string(), pairs }
    }

    /// Parses `?a=1&a=2&empty=` style query strings; blank values are kept.
    pub fn parse(path: &str, query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        let pairs = form_urlencoded::parse(query.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        Self::new(path, pairs)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn added(&self, key: &str, value: &str) -> Self {
        let mut pairs = self.pairs.clone();
        pairs.push((key.to_string(), value.to_string()));
        Self::new(&self.path, pairs)
    }

    pub fn removed(&self, key: &str, value: &str) -> Self {
        let pairs = self
            .pairs
            .iter()
            .filter(|(k, v)| !(k == key && v == value))
            .cloned()
            .collect();
        Self::new(&self.path, pairs)
    }

    pub fn to_url(&self) -> String {
        if self.pairs.is_empty() {
            return self.path.clone();
        }
        let encoded = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.pairs.iter())
            .finish();
        format!("{}?{}", self.path, encoded)
    }
}

impl FilterState for QueryString {
    fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }
    fn with_added(&self, key: &str, value: &str) -> String {
        self.added(key, value).to_url()
    }
    fn with_removed(&self, key: &str, value: &str) -> String {
        self.removed(key, value).to_url()
    }
}
