use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::config::StateId;
use super::engine::ActionContext;

const EXECUTE_PREFIX: &str = "execute:";
const NAVIGATE_PREFIX: &str = "navigate:";

/// What a dialog button does when pressed.
///
/// Textual forms: `close`, `back`, `close-all`, `navigate:<state>`,
/// `execute:<name>[:<arg>...]`, or a bare `<name>` (same as `execute:<name>`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DialogAction {
    Close,
    Back,
    CloseAll,
    Navigate(StateId),
    Execute { name: String, args: Vec<String> },
}

impl DialogAction {
    pub fn execute(name: impl Into<String>) -> Self {
        Self::Execute {
            name: name.into(),
            args: Vec::new(),
        }
    }

    pub fn handler_name(&self) -> Option<&str> {
        match self {
            Self::Execute { name, .. } => Some(name),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionParseError {
    #[error("action string is empty")]
    Empty,
    #[error("action '{raw}' is missing a {part}")]
    MissingPart { raw: String, part: &'static str },
    #[error("action '{raw}' contains whitespace in its name")]
    Whitespace { raw: String },
}

impl FromStr for DialogAction {
    type Err = ActionParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ActionParseError::Empty);
        }

        match trimmed {
            "close" => return Ok(Self::Close),
            "back" => return Ok(Self::Back),
            "close-all" | "closeAll" => return Ok(Self::CloseAll),
            _ => {}
        }

        if let Some(target) = trimmed.strip_prefix(NAVIGATE_PREFIX) {
            let target = target.trim();
            if target.is_empty() {
                return Err(ActionParseError::MissingPart {
                    raw: trimmed.to_string(),
                    part: "target state",
                });
            }
            return Ok(Self::Navigate(StateId::new(target)));
        }

        let body = trimmed.strip_prefix(EXECUTE_PREFIX).unwrap_or(trimmed);
        let mut parts = body.split(':').map(str::trim);
        let name = parts.next().unwrap_or_default();
        if name.is_empty() {
            return Err(ActionParseError::MissingPart {
                raw: trimmed.to_string(),
                part: "handler name",
            });
        }
        if name.chars().any(char::is_whitespace) {
            return Err(ActionParseError::Whitespace {
                raw: trimmed.to_string(),
            });
        }
        Ok(Self::Execute {
            name: name.to_string(),
            args: parts.map(ToString::to_string).collect(),
        })
    }
}

impl fmt::Display for DialogAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Close => f.write_str("close"),
            Self::Back => f.write_str("back"),
            Self::CloseAll => f.write_str("close-all"),
            Self::Navigate(target) => write!(f, "{NAVIGATE_PREFIX}{target}"),
            Self::Execute { name, args } => {
                write!(f, "{EXECUTE_PREFIX}{name}")?;
                for arg in args {
                    write!(f, ":{arg}")?;
                }
                Ok(())
            }
        }
    }
}

impl TryFrom<String> for DialogAction {
    type Error = ActionParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DialogAction> for String {
    fn from(value: DialogAction) -> Self {
        value.to_string()
    }
}

/// Failure reported by an action handler. Logged at the dispatch boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ActionError {
    pub message: String,
}

impl ActionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("action name cannot be empty")]
    EmptyName,
    #[error("duplicate action registration: {name}")]
    Duplicate { name: String },
}

type HandlerFn<H> = dyn FnMut(&mut ActionContext<'_, H>, &[String]) -> Result<(), ActionError>;

pub(crate) struct ActionSpec<H> {
    name: String,
    help: String,
    handler: Box<HandlerFn<H>>,
}

/// Named handlers for `execute:` actions, in registration order.
pub struct ActionRegistry<H> {
    specs: Vec<ActionSpec<H>>,
    lookup_by_name: HashMap<String, usize>,
}

impl<H> Default for ActionRegistry<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> ActionRegistry<H> {
    pub fn new() -> Self {
        Self {
            specs: Vec::new(),
            lookup_by_name: HashMap::new(),
        }
    }

    pub fn register<F>(
        &mut self,
        name: impl Into<String>,
        help: impl Into<String>,
        handler: F,
    ) -> Result<(), RegistryError>
    where
        F: FnMut(&mut ActionContext<'_, H>, &[String]) -> Result<(), ActionError> + 'static,
    {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if self.lookup_by_name.contains_key(&name) {
            return Err(RegistryError::Duplicate { name });
        }

        self.specs.push(ActionSpec {
            name: name.clone(),
            help: help.into(),
            handler: Box::new(handler),
        });
        self.lookup_by_name.insert(name, self.specs.len() - 1);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup_by_name.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn iter_in_order(&self) -> impl Iterator<Item = (&str, &str)> {
        self.specs
            .iter()
            .map(|spec| (spec.name.as_str(), spec.help.as_str()))
    }

    pub(crate) fn handler_mut(&mut self, name: &str) -> Option<&mut HandlerFn<H>> {
        let index = *self.lookup_by_name.get(name)?;
        self.specs.get_mut(index).map(|spec| spec.handler.as_mut())
    }
}
