//! Video metadata and the `videos.insert` request body

use crate::{Result, UploadError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Privacy status of an uploaded video
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Privacy {
    #[default]
    Private,
    Unlisted,
    Public,
}

impl Privacy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Privacy::Private => "private",
            Privacy::Unlisted => "unlisted",
            Privacy::Public => "public",
        }
    }
}

impl fmt::Display for Privacy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Privacy {
    type Err = UploadError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "private" => Ok(Privacy::Private),
            "unlisted" => Ok(Privacy::Unlisted),
            "public" => Ok(Privacy::Public),
            other => Err(UploadError::InvalidMetadata(format!(
                "privacy must be private, unlisted or public, got '{}'",
                other
            ))),
        }
    }
}

/// YouTube category names accepted in place of a numeric id
const CATEGORY_NAMES: &[(&str, u32)] = &[
    ("film", 1),
    ("autos", 2),
    ("music", 10),
    ("pets", 15),
    ("sports", 17),
    ("travel", 19),
    ("gaming", 20),
    ("people", 22),
    ("comedy", 23),
    ("entertainment", 24),
    ("news", 25),
    ("howto", 26),
    ("education", 27),
    ("science", 28),
];

/// YouTube video category id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category(pub u32);

impl Category {
    /// People & Blogs
    pub const DEFAULT: Category = Category(22);

    pub fn id(&self) -> u32 {
        self.0
    }

    pub fn name(&self) -> Option<&'static str> {
        CATEGORY_NAMES
            .iter()
            .find(|(_, id)| *id == self.0)
            .map(|(name, _)| *name)
    }
}

impl Default for Category {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl FromStr for Category {
    type Err = UploadError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Ok(id) = s.parse::<u32>() {
            return Ok(Category(id));
        }

        let lower = s.to_lowercase();
        CATEGORY_NAMES
            .iter()
            .find(|(name, _)| *name == lower)
            .map(|(_, id)| Category(*id))
            .ok_or_else(|| UploadError::InvalidMetadata(format!("unknown category '{}'", s)))
    }
}

/// Split a comma-separated tag list, trimming whitespace and dropping empty entries
pub fn parse_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Metadata for a video upload
#[derive(Debug, Clone, PartialEq)]
pub struct VideoMetadata {
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub category: Category,
    pub privacy: Privacy,
    /// Scheduled publish time, ISO 8601
    pub publish_at: Option<String>,
}

/// Accept RFC 3339 or an ISO 8601 date-time without an offset
fn parse_publish_time(value: &str) -> Result<()> {
    let rfc3339 = match chrono::DateTime::parse_from_rfc3339(value) {
        Ok(_) => return Ok(()),
        Err(e) => e,
    };
    if chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f").is_ok() {
        return Ok(());
    }

    Err(UploadError::InvalidMetadata(format!(
        "publish time '{}' is not an ISO 8601 date-time: {}",
        value, rfc3339
    )))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Snippet<'a> {
    title: &'a str,
    description: &'a str,
    tags: &'a [String],
    category_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Status<'a> {
    privacy_status: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    publish_at: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct VideoResource<'a> {
    snippet: Snippet<'a>,
    status: Status<'a>,
}

impl VideoMetadata {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            tags: Vec::new(),
            category: Category::DEFAULT,
            privacy: Privacy::Private,
            publish_at: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = category;
        self
    }

    pub fn with_privacy(mut self, privacy: Privacy) -> Self {
        self.privacy = privacy;
        self
    }

    pub fn with_publish_at(mut self, publish_at: Option<String>) -> Self {
        self.publish_at = publish_at;
        self
    }

    /// Check the fields YouTube would otherwise reject mid-upload
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(UploadError::InvalidMetadata("title must not be empty".to_string()));
        }

        if let Some(publish_at) = &self.publish_at {
            parse_publish_time(publish_at)?;

            if self.privacy != Privacy::Private {
                warn!(
                    "Scheduled publishing only takes effect for private videos (privacy is {})",
                    self.privacy
                );
            }
        }

        Ok(())
    }

    /// JSON body for `videos.insert` with `part=snippet,status`
    pub fn request_body(&self) -> serde_json::Value {
        let resource = VideoResource {
            snippet: Snippet {
                title: &self.title,
                description: &self.description,
                tags: &self.tags,
                category_id: self.category.id().to_string(),
            },
            status: Status {
                privacy_status: self.privacy.as_str(),
                publish_at: self.publish_at.as_deref(),
            },
        };

        // Plain structs of strings always serialize.
        serde_json::to_value(resource).unwrap_or_default()
    }
}
