use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Prefix for tracker labels derived from a [`TestIdentity`].
pub const IDENTITY_LABEL_PREFIX: &str = "faultline-";

/// Number of hex characters kept from the identity hash in labels.
const LABEL_HASH_LEN: usize = 16;

/// Stable identity of a test across runs.
///
/// The rule is simple:
/// - the same suite, name and parameter signature always produce the same key
/// - the key is printable and safe to use as a tracker label
///
/// Duplicate detection searches on [`TestIdentity::label`], so this must not
/// change between releases.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TestIdentity {
    /// Suite path, e.g. `tests/auth.rs` or `auth::login`.
    pub suite: String,
    /// Test function name.
    pub name: String,
    /// Parameter signature for parametrized tests. Empty when not parametrized.
    #[serde(default)]
    pub params: String,
}

impl TestIdentity {
    pub fn new(suite: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            suite: suite.into(),
            name: name.into(),
            params: String::new(),
        }
    }

    pub fn with_params(mut self, params: impl Into<String>) -> Self {
        self.params = params.into();
        self
    }

    /// Parse a runner node id of the form `suite::name` or `suite::name[params]`.
    ///
    /// The last `::` separates suite from name, so nested suites
    /// (`tests/api.rs::Users::test_create`) keep their full path.
    pub fn from_node_id(node_id: &str) -> Self {
        let (head, params) = match node_id.find('[') {
            Some(open) if node_id.ends_with(']') => {
                (&node_id[..open], &node_id[open + 1..node_id.len() - 1])
            }
            _ => (node_id, ""),
        };
        let (suite, name) = match head.rfind("::") {
            Some(idx) => (&head[..idx], &head[idx + 2..]),
            None => ("", head),
        };
        Self {
            suite: suite.to_string(),
            name: name.to_string(),
            params: params.to_string(),
        }
    }

    /// Runner-style node id. Inverse of [`TestIdentity::from_node_id`].
    pub fn node_id(&self) -> String {
        let mut out = String::new();
        if !self.suite.is_empty() {
            out.push_str(&self.suite);
            out.push_str("::");
        }
        out.push_str(&self.name);
        if !self.params.is_empty() {
            out.push('[');
            out.push_str(&self.params);
            out.push(']');
        }
        out
    }

    /// Deterministic tracker label, e.g. `faultline-3f9c0a1b2c3d4e5f`.
    ///
    /// Labels cannot contain whitespace in most trackers, so the identity is
    /// hashed rather than embedded.
    pub fn label(&self) -> String {
        let digest = hash_hex([&self.suite, &self.name, &self.params]);
        format!("{IDENTITY_LABEL_PREFIX}{}", &digest[..LABEL_HASH_LEN])
    }

    /// Filesystem-safe rendering of the node id.
    pub fn slug(&self) -> String {
        sanitize(&self.node_id())
    }
}

impl fmt::Display for TestIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.node_id())
    }
}

/// Identifier of one parallel worker process.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(String);

impl WorkerId {
    pub const ENV_VAR: &'static str = "FAULTLINE_WORKER";
    pub const DEFAULT: &'static str = "main";

    /// Build a worker id; the value is sanitized for use in file names.
    pub fn new(raw: &str) -> Self {
        let cleaned = sanitize(raw.trim());
        if cleaned.is_empty() {
            Self(Self::DEFAULT.to_string())
        } else {
            Self(cleaned)
        }
    }

    /// Worker id for the `index`-th spawned worker.
    pub fn indexed(index: usize) -> Self {
        Self(format!("w{index}"))
    }

    /// Resolve from `FAULTLINE_WORKER`, falling back to `main`.
    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        match lookup(Self::ENV_VAR) {
            Some(v) if !v.trim().is_empty() => Self::new(&v),
            _ => Self(Self::DEFAULT.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for WorkerId {
    fn default() -> Self {
        Self(Self::DEFAULT.to_string())
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Replace anything outside `[A-Za-z0-9._-]` with `_`.
pub fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// SHA-256 over length-prefixed parts, hex encoded.
///
/// Each part is preceded by its byte length as a little-endian `u64`, so no
/// choice of part contents can shift a boundary.
pub fn hash_hex(parts: impl IntoIterator<Item = impl AsRef<str>>) -> String {
    let mut hasher = Sha256::new();
    for p in parts {
        let bytes = p.as_ref().as_bytes();
        hasher.update((bytes.len() as u64).to_le_bytes());
        hasher.update(bytes);
    }
    hex::encode(hasher.finalize())
}
