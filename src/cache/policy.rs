//! Key-Class Policy Module
//!
//! Maps cache keys to per-class policies (TTL, strategy, tags, priority,
//! transforms) using structured key prefixes such as `api:user-profile` or
//! `dynamic:*`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// == Strategy ==
/// How callers should balance cached data against the origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    CacheFirst,
    NetworkFirst,
    StaleWhileRevalidate,
    CacheOnly,
    NetworkOnly,
}

// == Priority ==
/// Eviction tie-breaker. Ordered so that `Low < Medium < High`; lower
/// priorities are evicted first when access times are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

// == Key Class Policy ==
/// Immutable policy applied to every key of a class.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyClassPolicy {
    /// Class name, the prefix the policy was registered under
    pub class: String,
    #[serde(with = "duration_ms")]
    pub ttl: Duration,
    pub strategy: Strategy,
    /// Default tags, merged with caller supplied tags on write
    pub tags: Vec<String>,
    pub priority: Priority,
    pub compress: bool,
    pub encrypt: bool,
}

impl KeyClassPolicy {
    /// Creates a policy with no tags and no transforms.
    pub fn new(class: impl Into<String>, ttl: Duration, strategy: Strategy, priority: Priority) -> Self {
        Self {
            class: class.into(),
            ttl,
            strategy,
            tags: Vec::new(),
            priority,
            compress: false,
            encrypt: false,
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn compressed(mut self) -> Self {
        self.compress = true;
        self
    }

    pub fn encrypted(mut self) -> Self {
        self.encrypt = true;
        self
    }
}

// == Policy Override ==
/// Per-call adjustments layered over the resolved policy.
///
/// Every field left as `None` keeps the class value. Tags are merged with the
/// class tags rather than replacing them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolicyOverride {
    pub ttl: Option<Duration>,
    pub strategy: Option<Strategy>,
    pub tags: Vec<String>,
    pub priority: Option<Priority>,
    pub compress: Option<bool>,
    pub encrypt: Option<bool>,
}

impl PolicyOverride {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn ttl_ms(self, ms: u64) -> Self {
        self.ttl(Duration::from_millis(ms))
    }

    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn compress(mut self, compress: bool) -> Self {
        self.compress = Some(compress);
        self
    }

    pub fn encrypt(mut self, encrypt: bool) -> Self {
        self.encrypt = Some(encrypt);
        self
    }

    /// Produces the effective policy for one write.
    pub fn apply(&self, base: &KeyClassPolicy) -> KeyClassPolicy {
        let mut policy = base.clone();
        if let Some(ttl) = self.ttl {
            policy.ttl = ttl;
        }
        if let Some(strategy) = self.strategy {
            policy.strategy = strategy;
        }
        if let Some(priority) = self.priority {
            policy.priority = priority;
        }
        if let Some(compress) = self.compress {
            policy.compress = compress;
        }
        if let Some(encrypt) = self.encrypt {
            policy.encrypt = encrypt;
        }
        for tag in &self.tags {
            if !policy.tags.contains(tag) {
                policy.tags.push(tag.clone());
            }
        }
        policy
    }
}

// == Edge Rule ==
/// One row of the network-edge strategy table served to browser caches.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeRule {
    pub pattern: String,
    pub strategy: Strategy,
    pub ttl_millis: u64,
}

// == Key Class Resolver ==
/// Resolves keys to policies by longest matching prefix.
///
/// Prefixes match on segment boundaries: `api:user-profile` matches
/// `api:user-profile` and `api:user-profile:42` but not `api:user-profiles`.
/// A trailing `*` (as in `dynamic:*`) is accepted and ignored.
#[derive(Debug, Clone)]
pub struct KeyClassResolver {
    /// Sorted by prefix length, longest first
    classes: Vec<(String, KeyClassPolicy)>,
    default: KeyClassPolicy,
}

impl KeyClassResolver {
    /// Creates a resolver with only a fallback policy.
    pub fn new(default: KeyClassPolicy) -> Self {
        Self {
            classes: Vec::new(),
            default,
        }
    }

    /// Creates the resolver with the built-in key classes.
    ///
    /// `default_ttl` applies to keys matching no class.
    pub fn standard(default_ttl: Duration) -> Self {
        const MINUTE: u64 = 60;
        const HOUR: u64 = 60 * MINUTE;
        let secs = Duration::from_secs;

        Self::new(KeyClassPolicy::new(
            "default",
            default_ttl,
            Strategy::NetworkFirst,
            Priority::Low,
        ))
        .with_class(
            "api:*",
            KeyClassPolicy::new("api", secs(MINUTE), Strategy::NetworkFirst, Priority::Medium)
                .with_tags(["api"]),
        )
        .with_class(
            "api:user-profile",
            KeyClassPolicy::new(
                "api:user-profile",
                secs(5 * MINUTE),
                Strategy::StaleWhileRevalidate,
                Priority::High,
            )
            .with_tags(["api", "user"])
            .encrypted(),
        )
        .with_class(
            "api:search",
            KeyClassPolicy::new("api:search", secs(30), Strategy::NetworkFirst, Priority::Low)
                .with_tags(["api", "search"]),
        )
        .with_class(
            "static:*",
            KeyClassPolicy::new("static", secs(24 * HOUR), Strategy::CacheFirst, Priority::Medium)
                .with_tags(["static"])
                .compressed(),
        )
        .with_class(
            "static:images",
            KeyClassPolicy::new(
                "static:images",
                secs(7 * 24 * HOUR),
                Strategy::CacheFirst,
                Priority::Low,
            )
            .with_tags(["static", "images"]),
        )
        .with_class(
            "dynamic:*",
            KeyClassPolicy::new(
                "dynamic",
                secs(30),
                Strategy::StaleWhileRevalidate,
                Priority::Medium,
            )
            .with_tags(["dynamic"])
            .compressed(),
        )
        .with_class(
            "content:generated",
            KeyClassPolicy::new(
                "content:generated",
                secs(HOUR),
                Strategy::StaleWhileRevalidate,
                Priority::Medium,
            )
            .with_tags(["content"])
            .compressed(),
        )
        .with_class(
            "session:*",
            KeyClassPolicy::new("session", secs(30 * MINUTE), Strategy::CacheOnly, Priority::High)
                .with_tags(["session"])
                .encrypted(),
        )
    }

    /// Registers (or replaces) a key class.
    pub fn with_class(mut self, pattern: &str, policy: KeyClassPolicy) -> Self {
        let prefix = normalize(pattern).to_string();
        self.classes.retain(|(existing, _)| *existing != prefix);
        self.classes.push((prefix, policy));
        self.classes.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        self
    }

    /// Returns the policy of the longest matching class, or the default.
    pub fn resolve(&self, key: &str) -> &KeyClassPolicy {
        self.classes
            .iter()
            .find(|(prefix, _)| prefix_matches(prefix, key))
            .map(|(_, policy)| policy)
            .unwrap_or(&self.default)
    }

    pub fn default_policy(&self) -> &KeyClassPolicy {
        &self.default
    }

    /// Builds the edge strategy table from the registered classes.
    ///
    /// Key segments map to URL path segments (`api:user-profile` becomes
    /// `/api/user-profile/*`), so both caches share TTLs per resource class.
    pub fn edge_rules(&self) -> Vec<EdgeRule> {
        self.classes
            .iter()
            .map(|(prefix, policy)| EdgeRule {
                pattern: format!("/{}/*", prefix.trim_end_matches(':').replace(':', "/")),
                strategy: policy.strategy,
                ttl_millis: policy.ttl.as_millis() as u64,
            })
            .chain(std::iter::once(EdgeRule {
                pattern: "/*".to_string(),
                strategy: self.default.strategy,
                ttl_millis: self.default.ttl.as_millis() as u64,
            }))
            .collect()
    }
}

fn normalize(pattern: &str) -> &str {
    pattern.strip_suffix('*').unwrap_or(pattern)
}

fn prefix_matches(prefix: &str, key: &str) -> bool {
    match key.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || prefix.ends_with(':') || rest.starts_with(':'),
        None => false,
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }
}
