use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::content::fingerprint_states;

use super::action::DialogAction;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateId(String);

impl StateId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for StateId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for StateId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateKind {
    Screen,
    Dialog,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateContent {
    Static(String),
    /// Name of a generator registered in [`super::ContentTemplates`].
    Template(String),
}

impl Default for StateContent {
    fn default() -> Self {
        Self::Static(String::new())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonStyle {
    pub primary: bool,
    pub danger: bool,
    pub disabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonDef {
    pub text: String,
    pub action: DialogAction,
    #[serde(default)]
    pub style: ButtonStyle,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionSpec {
    pub enter: Option<String>,
    pub exit: Option<String>,
    pub duration_ms: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "trigger", rename_all = "snake_case")]
pub enum StateEventDef {
    /// Navigates to `target` once the state has been current for `delay_ms`.
    Timer { delay_ms: u64, target: StateId },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateDefinition {
    pub id: StateId,
    pub kind: StateKind,
    pub level: u32,
    pub parent: Option<StateId>,
    pub title: String,
    #[serde(default)]
    pub content: StateContent,
    #[serde(default)]
    pub buttons: Vec<ButtonDef>,
    #[serde(default)]
    pub transition: Option<TransitionSpec>,
    #[serde(default)]
    pub events: Vec<StateEventDef>,
}

impl StateDefinition {
    pub fn new(id: impl Into<String>, kind: StateKind, level: u32) -> Self {
        Self {
            id: StateId::new(id),
            kind,
            level,
            parent: None,
            title: String::new(),
            content: StateContent::default(),
            buttons: Vec::new(),
            transition: None,
            events: Vec::new(),
        }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(StateId::new(parent));
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_content(mut self, content: StateContent) -> Self {
        self.content = content;
        self
    }

    pub fn with_button(mut self, text: impl Into<String>, action: DialogAction) -> Self {
        self.buttons.push(ButtonDef {
            text: text.into(),
            action,
            style: ButtonStyle::default(),
        });
        self
    }

    pub fn with_timer(mut self, delay_ms: u64, target: impl Into<String>) -> Self {
        self.events.push(StateEventDef::Timer {
            delay_ms,
            target: StateId::new(target),
        });
        self
    }

    pub fn is_root_screen(&self) -> bool {
        self.level == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("state id cannot be empty")]
    EmptyStateId,
    #[error("duplicate state id '{id}'")]
    DuplicateState { id: StateId },
    #[error("state '{state}' references unknown parent '{parent}'")]
    UnknownParent { state: StateId, parent: StateId },
    #[error("state '{state}' has level {actual}; its parent requires level {expected}")]
    LevelMismatch {
        state: StateId,
        expected: u32,
        actual: u32,
    },
    #[error("parentless state '{state}' must be a level 0 screen or a level 1 state, got level {level}")]
    OrphanLevel { state: StateId, level: u32 },
    #[error("level 0 state '{state}' must be a screen")]
    RootMustBeScreen { state: StateId },
    #[error("state '{state}' {source_kind} targets unknown state '{target}'")]
    UnknownTarget {
        state: StateId,
        source_kind: &'static str,
        target: StateId,
    },
}

impl ConfigError {
    /// State the error was raised for, when there is one.
    pub fn state(&self) -> Option<&StateId> {
        match self {
            Self::EmptyStateId => None,
            Self::DuplicateState { id } => Some(id),
            Self::UnknownParent { state, .. }
            | Self::LevelMismatch { state, .. }
            | Self::OrphanLevel { state, .. }
            | Self::RootMustBeScreen { state }
            | Self::UnknownTarget { state, .. } => Some(state),
        }
    }
}

/// Static dialog graph. Validated on construction and immutable afterwards.
#[derive(Debug, Clone)]
pub struct DialogConfig {
    states: Vec<StateDefinition>,
    index_by_id: HashMap<StateId, usize>,
    fingerprint: String,
}

impl DialogConfig {
    pub fn new(states: Vec<StateDefinition>) -> Result<Self, ConfigError> {
        let mut index_by_id = HashMap::with_capacity(states.len());
        for (index, state) in states.iter().enumerate() {
            if state.id.as_str().trim().is_empty() {
                return Err(ConfigError::EmptyStateId);
            }
            if index_by_id.insert(state.id.clone(), index).is_some() {
                return Err(ConfigError::DuplicateState {
                    id: state.id.clone(),
                });
            }
        }

        for state in &states {
            validate_hierarchy(state, &states, &index_by_id)?;
            validate_targets(state, &index_by_id)?;
        }

        let fingerprint = fingerprint_states(&states);
        Ok(Self {
            states,
            index_by_id,
            fingerprint,
        })
    }

    pub fn get(&self, id: &str) -> Option<&StateDefinition> {
        self.index_by_id
            .get(id)
            .and_then(|index| self.states.get(*index))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index_by_id.contains_key(id)
    }

    /// Declaration order.
    pub fn states(&self) -> &[StateDefinition] {
        &self.states
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// SHA-256 hex digest of the canonical state list.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub(crate) fn declared_actions(&self) -> impl Iterator<Item = (&StateId, &DialogAction)> {
        self.states.iter().flat_map(|state| {
            state
                .buttons
                .iter()
                .map(move |button| (&state.id, &button.action))
        })
    }

    pub(crate) fn declared_templates(&self) -> impl Iterator<Item = (&StateId, &str)> {
        self.states.iter().filter_map(|state| match &state.content {
            StateContent::Template(name) => Some((&state.id, name.as_str())),
            StateContent::Static(_) => None,
        })
    }
}

fn validate_hierarchy(
    state: &StateDefinition,
    states: &[StateDefinition],
    index_by_id: &HashMap<StateId, usize>,
) -> Result<(), ConfigError> {
    if state.level == 0 && state.kind != StateKind::Screen {
        return Err(ConfigError::RootMustBeScreen {
            state: state.id.clone(),
        });
    }

    let Some(parent_id) = &state.parent else {
        if state.level > 1 {
            return Err(ConfigError::OrphanLevel {
                state: state.id.clone(),
                level: state.level,
            });
        }
        return Ok(());
    };

    let parent = index_by_id
        .get(parent_id)
        .and_then(|index| states.get(*index))
        .ok_or_else(|| ConfigError::UnknownParent {
            state: state.id.clone(),
            parent: parent_id.clone(),
        })?;
    let expected = parent.level.saturating_add(1);
    if state.level != expected {
        return Err(ConfigError::LevelMismatch {
            state: state.id.clone(),
            expected,
            actual: state.level,
        });
    }
    Ok(())
}

fn validate_targets(
    state: &StateDefinition,
    index_by_id: &HashMap<StateId, usize>,
) -> Result<(), ConfigError> {
    for event in &state.events {
        let StateEventDef::Timer { target, .. } = event;
        if !index_by_id.contains_key(target) {
            return Err(ConfigError::UnknownTarget {
                state: state.id.clone(),
                source_kind: "timer",
                target: target.clone(),
            });
        }
    }
    for button in &state.buttons {
        if let DialogAction::Navigate(target) = &button.action {
            if !index_by_id.contains_key(target) {
                return Err(ConfigError::UnknownTarget {
                    state: state.id.clone(),
                    source_kind: "button",
                    target: target.clone(),
                });
            }
        }
    }
    Ok(())
}
