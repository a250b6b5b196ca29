use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Kind of content a pipeline run produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    #[default]
    Article,
    Guide,
    Faq,
    ServicePage,
}

impl ContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Article => "article",
            Self::Guide => "guide",
            Self::Faq => "faq",
            Self::ServicePage => "service_page",
        }
    }

    /// schema.org type used for the structured-data block.
    pub fn schema_type(self) -> &'static str {
        match self {
            Self::Article => "Article",
            Self::Guide => "HowTo",
            Self::Faq => "FAQPage",
            Self::ServicePage => "Service",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ContentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "article" => Ok(Self::Article),
            "guide" | "howto" => Ok(Self::Guide),
            "faq" => Ok(Self::Faq),
            "service_page" | "service" => Ok(Self::ServicePage),
            other => Err(format!("unknown content type: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestOptions {
    /// Minimum body length the compliance check expects.
    #[serde(default = "default_min_words")]
    pub min_words: usize,

    #[serde(default)]
    pub tone: Option<String>,

    #[serde(default)]
    pub audience: Option<String>,

    /// Free-form hints forwarded to every prompt.
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

fn default_min_words() -> usize {
    300
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            min_words: default_min_words(),
            tone: None,
            audience: None,
            extra: BTreeMap::new(),
        }
    }
}

/// Immutable input to one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    subject: String,
    keyword: Option<String>,
    content_type: ContentType,
    options: RequestOptions,
}

impl Request {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            keyword: None,
            content_type: ContentType::default(),
            options: RequestOptions::default(),
        }
    }

    pub fn with_keyword(mut self, keyword: impl Into<String>) -> Self {
        let keyword = keyword.into();
        self.keyword = (!keyword.trim().is_empty()).then_some(keyword);
        self
    }

    pub fn with_content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = content_type;
        self
    }

    pub fn with_options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn keyword(&self) -> Option<&str> {
        self.keyword.as_deref()
    }

    pub fn content_type(&self) -> ContentType {
        self.content_type
    }

    pub fn options(&self) -> &RequestOptions {
        &self.options
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.subject.trim().is_empty() {
            return Err(PipelineError::InvalidRequest(
                "subject must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
