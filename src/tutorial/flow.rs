//! Tutorial flow definition — the immutable onboarding script.
//!
//! Loaded once at startup from YAML:
//!
//! ```yaml
//! resources_base_url: "https://example.org/img/"
//! templates:
//!   Name: "there"
//! initial_delay: 1000
//! tutorial:
//!   steps:
//!     - type: text
//!       body: "Hi {{.Name}}!"
//!       delay: 2000
//!     - type: image
//!       body: "The room list"
//!       src: "rooms.png"
//! ```
//!
//! Delays are integer milliseconds. Zero or negative means "advance
//! immediately".

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Deserializer};

use super::template::Template;
use crate::error::FlowError;

/// Message kind of a step. Unknown kinds are sent as text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StepKind {
    #[default]
    Text,
    Notice,
    Image,
}

impl From<&str> for StepKind {
    fn from(value: &str) -> Self {
        match value {
            "notice" => Self::Notice,
            "image" => Self::Image,
            _ => Self::Text,
        }
    }
}

impl<'de> Deserialize<'de> for StepKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().map(StepKind::from).unwrap_or_default())
    }
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Text => "text",
            Self::Notice => "notice",
            Self::Image => "image",
        };
        write!(f, "{s}")
    }
}

/// One scripted message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Step {
    #[serde(rename = "type")]
    pub kind: StepKind,
    /// Template source of the message body (caption for images).
    pub body: String,
    /// Resource path relative to `resources_base_url`, images only.
    pub src: String,
    /// Wait after sending this step before advancing.
    #[serde(deserialize_with = "millis")]
    pub delay: Duration,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct TutorialSection {
    steps: Vec<Step>,
}

/// The whole script. Immutable once loaded.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FlowDefinition {
    pub resources_base_url: String,
    /// Named default values, exposed to step templates as variables.
    pub templates: HashMap<String, String>,
    #[serde(deserialize_with = "millis")]
    pub initial_delay: Duration,
    tutorial: TutorialSection,
}

impl FlowDefinition {
    /// Build a flow in code.
    pub fn new(
        resources_base_url: impl Into<String>,
        templates: HashMap<String, String>,
        initial_delay: Duration,
        steps: Vec<Step>,
    ) -> Self {
        Self {
            resources_base_url: resources_base_url.into(),
            templates,
            initial_delay,
            tutorial: TutorialSection { steps },
        }
    }

    /// Parse a flow from YAML text.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, FlowError> {
        let flow: Self = serde_yaml::from_str(yaml)?;
        flow.warn_on_malformed_templates();
        Ok(flow)
    }

    /// Read and parse a flow file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, FlowError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|source| FlowError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let flow = Self::from_yaml_str(&yaml)?;
        tracing::info!(
            path = %path.display(),
            steps = flow.steps().len(),
            "Loaded tutorial flow"
        );
        Ok(flow)
    }

    pub fn steps(&self) -> &[Step] {
        &self.tutorial.steps
    }

    pub fn step(&self, index: usize) -> Option<&Step> {
        self.tutorial.steps.get(index)
    }

    pub fn len(&self) -> usize {
        self.tutorial.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tutorial.steps.is_empty()
    }

    /// Image URL of a step: plain concatenation, no normalization.
    pub fn image_url(&self, step: &Step) -> String {
        format!("{}{}", self.resources_base_url, step.src)
    }

    fn warn_on_malformed_templates(&self) {
        for (index, step) in self.steps().iter().enumerate() {
            if step.body.is_empty() {
                continue;
            }
            if let Err(e) = Template::parse(&step.body) {
                tracing::warn!(step = index, error = %e, "Tutorial step has a malformed body template");
            }
        }
    }
}

fn millis<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    let ms = Option::<i64>::deserialize(deserializer)?.unwrap_or(0);
    Ok(Duration::from_millis(ms.max(0) as u64))
}
