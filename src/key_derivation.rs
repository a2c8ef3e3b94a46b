//! Cache key derivation.
//!
//! Keys are rendered from a callable's identity and its arguments into a
//! readable string, then sanitized for memcached-style backends:
//!
//! ```text
//! [cached]app.users.load|function|[42,"eu"]|{"active":true}
//! ```
//!
//! Sanitization percent-encodes whitespace, control characters and `%`, so
//! it never merges two distinct renderings. Keys that are still longer than
//! [`KeyConfig::max_key_length`] keep a readable prefix and end in `-` plus
//! the SHA-256 of the full rendering.

use crate::args::KeyArgs;
use crate::identity::{CallableIdentity, CallableKind};
use crate::{error::Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::{self, Write};
use std::sync::Arc;

/// Longest key memcached accepts.
pub const DEFAULT_MAX_KEY_LENGTH: usize = 250;

/// Prefix marking keys written by this crate.
pub const DEFAULT_KEY_PREFIX: &str = "[cached]";

/// Length of the `-<sha256 hex>` tail of a hashed key.
pub const HASH_SUFFIX_LEN: usize = 65;

const SEPARATOR: char = '|';

/// Rewrites a callable's qualified name per call, e.g. to add a tenant or
/// version segment. Receives the qualified name and the call's arguments.
pub type NameTransform = Arc<dyn Fn(&str, &KeyArgs) -> String + Send + Sync>;

/// Backend key constraints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyConfig {
    /// Prepended to every key.
    pub prefix: String,
    /// Maximum key length in bytes.
    pub max_key_length: usize,
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_KEY_PREFIX.to_string(),
            max_key_length: DEFAULT_MAX_KEY_LENGTH,
        }
    }
}

impl KeyConfig {
    /// Sets the key prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Sets the maximum key length.
    pub fn with_max_key_length(mut self, max_key_length: usize) -> Self {
        self.max_key_length = max_key_length;
        self
    }

    /// Checks that every rendering can be made to fit.
    pub fn validate(&self) -> Result<()> {
        if self.max_key_length < HASH_SUFFIX_LEN {
            return Err(Error::InvalidConfig(format!(
                "max_key_length must be at least {} bytes, got {}",
                HASH_SUFFIX_LEN, self.max_key_length
            )));
        }
        if self.prefix.chars().any(needs_escape) {
            return Err(Error::InvalidConfig(format!(
                "key prefix {:?} contains characters that are not key-safe",
                self.prefix
            )));
        }
        Ok(())
    }
}

/// A sanitized, backend-safe cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    key: String,
    hashed: bool,
}

impl CacheKey {
    /// The key as sent to the backend.
    pub fn as_str(&self) -> &str {
        &self.key
    }

    /// Whether the readable rendering was too long and got a hash tail.
    pub fn is_hashed(&self) -> bool {
        self.hashed
    }

    /// Consumes the key, returning the string.
    pub fn into_string(self) -> String {
        self.key
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.key
    }
}

/// Builds cache keys for one configuration.
#[derive(Clone, Default)]
pub struct KeyBuilder {
    config: KeyConfig,
    name_transform: Option<NameTransform>,
}

impl fmt::Debug for KeyBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyBuilder")
            .field("config", &self.config)
            .field("name_transform", &self.name_transform.is_some())
            .finish()
    }
}

impl KeyBuilder {
    /// Creates a builder after validating `config`.
    pub fn new(config: KeyConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            name_transform: None,
        })
    }

    /// Installs a name transform.
    pub fn with_name_transform(mut self, transform: NameTransform) -> Self {
        self.name_transform = Some(transform);
        self
    }

    /// Derives the key for one invocation of `identity`.
    pub fn build(&self, identity: &CallableIdentity, args: &KeyArgs) -> Result<CacheKey> {
        let raw = self.render(identity, args)?;
        Ok(sanitize(&raw, self.config.max_key_length))
    }

    /// Renders the readable, unsanitized form of the key.
    pub fn render(&self, identity: &CallableIdentity, args: &KeyArgs) -> Result<String> {
        match (identity.kind(), args.receiver()) {
            (CallableKind::Method, None) => {
                return Err(Error::InvalidInvocation(format!(
                    "method `{}` called without a bound receiver",
                    identity.qualified_name()
                )))
            }
            (CallableKind::Function | CallableKind::ClassMethod, Some(_)) => {
                return Err(Error::InvalidInvocation(format!(
                    "`{}` is a {} and takes no receiver",
                    identity.qualified_name(),
                    identity.kind()
                )))
            }
            _ => {}
        }

        let name = match &self.name_transform {
            Some(transform) => transform(identity.qualified_name(), args),
            None => identity.qualified_name().to_string(),
        };

        let mut raw = String::with_capacity(self.config.prefix.len() + name.len() + 32);
        raw.push_str(&self.config.prefix);
        raw.push_str(&name);
        raw.push(SEPARATOR);
        raw.push_str(identity.kind().tag());
        if let Some(receiver) = args.receiver() {
            raw.push('@');
            raw.push_str(&render_json(&receiver)?);
        }
        raw.push(SEPARATOR);
        raw.push_str(&render_json(&args.positional())?);
        raw.push(SEPARATOR);
        raw.push_str(&render_json(&args.keywords())?);
        Ok(raw)
    }
}

fn render_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| Error::UnserializableArgument(e.to_string()))
}

fn needs_escape(c: char) -> bool {
    c == '%' || c.is_whitespace() || c.is_control()
}

/// Makes `raw` safe for the backend.
///
/// Escaping is injective. When the escaped key exceeds `max_len` bytes it
/// is cut at a character boundary and suffixed with `-` and the SHA-256 of
/// `raw`. `max_len` must be at least [`HASH_SUFFIX_LEN`], which
/// [`KeyConfig::validate`] enforces; the result then never exceeds it.
pub(crate) fn sanitize(raw: &str, max_len: usize) -> CacheKey {
    debug_assert!(max_len >= HASH_SUFFIX_LEN);
    let mut key = String::with_capacity(raw.len());
    for c in raw.chars() {
        if needs_escape(c) {
            let mut buf = [0u8; 4];
            for byte in c.encode_utf8(&mut buf).bytes() {
                // Writing to a String cannot fail.
                let _ = write!(key, "%{:02X}", byte);
            }
        } else {
            key.push(c);
        }
    }

    if key.len() <= max_len {
        return CacheKey { key, hashed: false };
    }

    let mut cut = max_len.saturating_sub(HASH_SUFFIX_LEN);
    while !key.is_char_boundary(cut) {
        cut -= 1;
    }
    key.truncate(cut);
    key.push('-');
    key.push_str(&sha256_hex(raw));
    CacheKey { key, hashed: true }
}

fn sha256_hex(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}
