use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use super::config::{ButtonStyle, StateContent, StateDefinition, StateId, StateKind, TransitionSpec};

pub const CONTENT_FALLBACK_MESSAGE: &str =
    "This panel could not be displayed right now. Close it and try again.";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContentError {
    #[error("missing bound data for state '{state}'")]
    MissingData { state: StateId },
    #[error("bound data field '{field}' is missing or has the wrong type")]
    InvalidField { field: String },
    #[error("{0}")]
    Other(String),
}

type TemplateFn = dyn Fn(&StateDefinition, Option<&Value>) -> Result<String, ContentError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedButton {
    pub text: String,
    pub action: String,
    pub style: ButtonStyle,
}

/// Output of the content step, handed to whatever draws dialogs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedDialog {
    pub state: StateId,
    pub kind: StateKind,
    pub level: u32,
    pub title: String,
    pub body: String,
    pub buttons: Vec<RenderedButton>,
    pub transition: Option<TransitionSpec>,
    /// Set when `body` is [`CONTENT_FALLBACK_MESSAGE`] because generation failed.
    pub fallback: bool,
}

/// Named content generators. Generators receive the state's bound data, which
/// may be absent.
#[derive(Default)]
pub struct ContentTemplates {
    templates: HashMap<String, Box<TemplateFn>>,
}

impl ContentTemplates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Later registrations under the same name replace earlier ones.
    pub fn register<F>(&mut self, name: impl Into<String>, generator: F)
    where
        F: Fn(&StateDefinition, Option<&Value>) -> Result<String, ContentError> + 'static,
    {
        self.templates.insert(name.into(), Box::new(generator));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    pub fn render(&self, definition: &StateDefinition, data: Option<&Value>) -> RenderedDialog {
        let (body, fallback) = match &definition.content {
            StateContent::Static(text) => (text.clone(), false),
            StateContent::Template(name) => match self.templates.get(name) {
                Some(generator) => match generator(definition, data) {
                    Ok(body) => (body, false),
                    Err(error) => {
                        warn!(
                            state = %definition.id,
                            template = %name,
                            error = %error,
                            "dialog_content_failed"
                        );
                        (CONTENT_FALLBACK_MESSAGE.to_string(), true)
                    }
                },
                None => {
                    warn!(state = %definition.id, template = %name, "dialog_template_missing");
                    (CONTENT_FALLBACK_MESSAGE.to_string(), true)
                }
            },
        };

        RenderedDialog {
            state: definition.id.clone(),
            kind: definition.kind,
            level: definition.level,
            title: definition.title.clone(),
            body,
            buttons: definition
                .buttons
                .iter()
                .map(|button| RenderedButton {
                    text: button.text.clone(),
                    action: button.action.to_string(),
                    style: button.style,
                })
                .collect(),
            transition: definition.transition.clone(),
            fallback,
        }
    }
}

/// Reads a string field from bound data, for use inside generators.
pub fn data_str<'a>(data: Option<&'a Value>, field: &str) -> Result<&'a str, ContentError> {
    data.and_then(|value| value.get(field))
        .and_then(Value::as_str)
        .ok_or_else(|| ContentError::InvalidField {
            field: field.to_string(),
        })
}

pub fn data_i64(data: Option<&Value>, field: &str) -> Result<i64, ContentError> {
    data.and_then(|value| value.get(field))
        .and_then(Value::as_i64)
        .ok_or_else(|| ContentError::InvalidField {
            field: field.to_string(),
        })
}
