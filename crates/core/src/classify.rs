//! Content-type classification and extraction policy.
//!
//! Before anything is fetched, a URL is classified into a coarse content
//! type (PDF, video, code hosting, academic publisher, documentation site,
//! or plain HTML) and checked against a per-type domain policy. The check
//! is advisory — it tells callers whether extraction is worth attempting,
//! it is not a security boundary.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use url::Url;

/// Coarse resource classes, checked in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Pdf,
    Video,
    Code,
    Academic,
    Documentation,
    Html,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Pdf => "pdf",
            ContentType::Video => "video",
            ContentType::Code => "code",
            ContentType::Academic => "academic",
            ContentType::Documentation => "documentation",
            ContentType::Html => "html",
        }
    }
}

/// Per-type allow/deny policy. The deny list always wins; `"*"` in the
/// allow list admits any domain.
#[derive(Debug, Clone, Deserialize)]
pub struct TypePolicy {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_domains")]
    pub domains: Vec<String>,
    #[serde(rename = "restrictedDomains", default)]
    pub restricted_domains: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
}

fn default_enabled() -> bool {
    true
}

fn default_domains() -> Vec<String> {
    vec!["*".to_string()]
}

impl TypePolicy {
    fn open() -> Self {
        Self { enabled: true, domains: default_domains(), restricted_domains: Vec::new(), description: None }
    }

    fn disabled(domains: &[&str]) -> Self {
        Self {
            enabled: false,
            domains: domains.iter().map(|d| d.to_string()).collect(),
            restricted_domains: Vec::new(),
            description: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct Restrictions {
    #[serde(rename = "allowUnknownTypes", default = "default_enabled")]
    allow_unknown_types: bool,
}

impl Default for Restrictions {
    fn default() -> Self {
        Self { allow_unknown_types: true }
    }
}

/// On-disk shape of `content-types.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(rename = "allowedContentTypes", default)]
    types: HashMap<String, TypePolicy>,
    #[serde(default)]
    restrictions: Restrictions,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        let mut types = HashMap::new();
        types.insert("pdf".to_string(), TypePolicy::open());
        types.insert("html".to_string(), TypePolicy::open());
        types.insert(
            "video".to_string(),
            TypePolicy::disabled(&["youtube.com", "youtu.be", "m.youtube.com"]),
        );
        Self { enabled: true, types, restrictions: Restrictions { allow_unknown_types: true } }
    }
}

/// The classifier's verdict for one URL.
#[derive(Debug, Clone, Serialize)]
pub struct Classification {
    pub allowed: bool,
    pub reason: String,
    #[serde(rename = "contentType", skip_serializing_if = "Option::is_none")]
    pub content_type: Option<ContentType>,
}

/// URL classifier with a configurable extraction policy.
#[derive(Debug, Clone)]
pub struct Classifier {
    config: ClassifierConfig,
}

const VIDEO_HOSTS: &[&str] = &["youtube.com", "www.youtube.com", "m.youtube.com", "youtu.be"];

const CODE_HOSTS: &[&str] = &["github.com", "www.github.com", "raw.githubusercontent.com"];

const ACADEMIC_HOSTS: &[&str] = &[
    "arxiv.org",
    "ieee.org",
    "ieeexplore.ieee.org",
    "acm.org",
    "dl.acm.org",
    "springer.com",
    "link.springer.com",
    "nature.com",
    "researchgate.net",
];

const DOC_PATH_PATTERNS: &[&str] = &[
    "/docs/",
    "/documentation/",
    "/api/",
    "/guide/",
    "/tutorial/",
    "/manual/",
    "/help/",
    "/wiki/",
    "/reference/",
];

const DOC_DOMAIN_PREFIXES: &[&str] = &["docs.", "documentation.", "wiki.", "manual.", "guide.", "help.", "api."];

impl Default for Classifier {
    fn default() -> Self {
        Self { config: ClassifierConfig::default() }
    }
}

impl Classifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    /// Loads `content-types.json`, falling back to defaults when the file
    /// is missing or unparsable.
    pub fn from_file(path: &Path) -> Self {
        let config = std::fs::read_to_string(path)
            .ok()
            .and_then(|data| serde_json::from_str(&data).ok())
            .unwrap_or_else(|| {
                tracing::warn!(path = %path.display(), "content-type config unavailable, using defaults");
                ClassifierConfig::default()
            });
        Self { config }
    }

    /// Classifies a URL and checks it against the extraction policy.
    ///
    /// A malformed URL is never allowed. With the policy globally disabled,
    /// every well-formed URL passes (the type is still reported).
    pub fn classify(&self, url: &str) -> Classification {
        let parsed = match Url::parse(url) {
            Ok(parsed) => parsed,
            Err(_) => {
                return Classification { allowed: false, reason: "URL格式无效".to_string(), content_type: None };
            }
        };

        let hostname = parsed.host_str().unwrap_or("").to_lowercase();
        let pathname = parsed.path().to_lowercase();
        let content_type = detect_type(url, &hostname, &pathname);

        if !self.config.enabled {
            return Classification {
                allowed: true,
                reason: "内容类型限制已禁用".to_string(),
                content_type: Some(content_type),
            };
        }

        self.check_policy(content_type, &hostname)
    }

    fn check_policy(&self, content_type: ContentType, hostname: &str) -> Classification {
        let Some(policy) = self.config.types.get(content_type.as_str()) else {
            let allowed = self.config.restrictions.allow_unknown_types;
            let reason = if allowed { "允许未知内容类型" } else { "不允许未知内容类型" };
            return Classification { allowed, reason: reason.to_string(), content_type: Some(content_type) };
        };

        if !policy.enabled {
            let label = policy.description.as_deref().unwrap_or(content_type.as_str());
            return Classification {
                allowed: false,
                reason: format!("{}类型已被禁用", label),
                content_type: Some(content_type),
            };
        }

        // Deny list is checked first and always wins.
        for denied in &policy.restricted_domains {
            if hostname.contains(&denied.to_lowercase()) {
                return Classification {
                    allowed: false,
                    reason: format!("域名 {} 在禁止列表中", hostname),
                    content_type: Some(content_type),
                };
            }
        }

        if !policy.domains.is_empty() {
            if policy.domains.iter().any(|d| d == "*") {
                return Classification {
                    allowed: true,
                    reason: "域名检查通过".to_string(),
                    content_type: Some(content_type),
                };
            }
            for allowed in &policy.domains {
                if hostname.contains(&allowed.to_lowercase()) {
                    return Classification {
                        allowed: true,
                        reason: "域名检查通过".to_string(),
                        content_type: Some(content_type),
                    };
                }
            }
            return Classification {
                allowed: false,
                reason: format!("域名 {} 不在允许列表中", hostname),
                content_type: Some(content_type),
            };
        }

        Classification { allowed: true, reason: "域名检查通过".to_string(), content_type: Some(content_type) }
    }
}

/// Derive the content type by priority: PDF, then known video / code /
/// academic hosts, then documentation heuristics, else HTML.
fn detect_type(url: &str, hostname: &str, pathname: &str) -> ContentType {
    if looks_like_pdf(url, pathname) {
        return ContentType::Pdf;
    }
    if VIDEO_HOSTS.contains(&hostname) {
        return ContentType::Video;
    }
    if CODE_HOSTS.contains(&hostname) {
        return ContentType::Code;
    }
    if ACADEMIC_HOSTS.iter().any(|host| hostname.contains(host)) {
        return ContentType::Academic;
    }
    if DOC_PATH_PATTERNS.iter().any(|p| pathname.contains(p))
        || DOC_DOMAIN_PREFIXES.iter().any(|p| hostname.starts_with(p))
    {
        return ContentType::Documentation;
    }
    ContentType::Html
}

/// PDF detection for classification purposes: extension, `pdf` anywhere in
/// the URL, or a known publisher PDF-link pattern.
fn looks_like_pdf(url: &str, pathname: &str) -> bool {
    if pathname.ends_with(".pdf") {
        return true;
    }
    let lower = url.to_lowercase();
    if lower.contains("pdf") {
        return true;
    }
    const PUBLISHER_PATTERNS: &[(&str, &str)] = &[
        ("dl.acm.org", "/doi/pdf/"),
        ("ieeexplore.ieee.org", "/stamp/"),
        ("link.springer.com", "/content/pdf/"),
        ("arxiv.org", "/pdf/"),
    ];
    PUBLISHER_PATTERNS.iter().any(|(host, pattern)| lower.contains(host) && lower.contains(pattern))
}
