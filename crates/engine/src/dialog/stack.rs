use thiserror::Error;

use super::config::{DialogConfig, StateId, StateKind};

/// Why a navigation request was refused. The stack is never mutated on rejection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionRejection {
    #[error("unknown state '{target}'")]
    UnknownState { target: StateId },
    #[error("state '{target}' at level {level} skips a level (stack depth {depth})")]
    SkippedLevel {
        target: StateId,
        level: u32,
        depth: usize,
    },
    #[error("state '{target}' expects parent {expected:?} but the stack below it is {actual:?}")]
    ParentMismatch {
        target: StateId,
        expected: Option<StateId>,
        actual: Option<StateId>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StackInvariantError {
    #[error("stack entry {index} references unknown state '{state}'")]
    UnknownState { index: usize, state: StateId },
    #[error("stack entry {index} ('{state}') has level {actual}, expected {expected}")]
    LevelMismatch {
        index: usize,
        state: StateId,
        expected: u32,
        actual: u32,
    },
    #[error("stack entry {index} ('{state}') is not a child of the entry below it")]
    ParentMismatch { index: usize, state: StateId },
    #[error("bottom stack entry '{state}' has a parent that is not a root screen")]
    DetachedBottom { state: StateId },
}

/// Accepted outcome of [`plan_transition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionPlan {
    /// Target is already on top.
    Unchanged,
    /// Target is on top and should be re-rendered with fresh data.
    Refresh,
    /// Level-0 target: close everything and hand off to the screen layer.
    Screen,
    /// Keep the first `keep` entries, then push the target.
    Push { keep: usize },
}

/// Ordered active states, innermost last.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NavigationStack {
    entries: Vec<StateId>,
}

impl NavigationStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[StateId] {
        &self.entries
    }

    pub fn top(&self) -> Option<&StateId> {
        self.entries.last()
    }

    pub fn depth(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.iter().any(|entry| entry.as_str() == id)
    }

    pub(crate) fn push(&mut self, id: StateId) {
        self.entries.push(id);
    }

    pub(crate) fn pop(&mut self) -> Option<StateId> {
        self.entries.pop()
    }

    /// Removes everything above `len`, returning removed entries innermost first.
    pub(crate) fn truncate(&mut self, len: usize) -> Vec<StateId> {
        if len >= self.entries.len() {
            return Vec::new();
        }
        let mut removed = self.entries.split_off(len);
        removed.reverse();
        removed
    }

    pub(crate) fn replace(&mut self, entries: Vec<StateId>) -> Vec<StateId> {
        let mut removed = std::mem::replace(&mut self.entries, entries);
        removed.reverse();
        removed
    }

    /// Length to keep for `close`: up to and including the nearest screen entry below the top.
    pub(crate) fn close_keep_len(&self, config: &DialogConfig) -> usize {
        let below_top = self.entries.len().saturating_sub(1);
        self.entries[..below_top]
            .iter()
            .rposition(|entry| {
                config
                    .get(entry.as_str())
                    .is_some_and(|definition| definition.kind == StateKind::Screen)
            })
            .map_or(0, |index| index + 1)
    }
}

pub fn plan_transition(
    stack: &NavigationStack,
    config: &DialogConfig,
    target: &str,
    refresh: bool,
) -> Result<TransitionPlan, TransitionRejection> {
    let definition = config
        .get(target)
        .ok_or_else(|| TransitionRejection::UnknownState {
            target: StateId::from(target),
        })?;

    if stack.top().is_some_and(|top| top.as_str() == target) {
        return Ok(if refresh {
            TransitionPlan::Refresh
        } else {
            TransitionPlan::Unchanged
        });
    }

    if definition.is_root_screen() {
        return Ok(TransitionPlan::Screen);
    }

    let level = definition.level as usize;
    let depth = stack.depth();
    if level > depth + 1 {
        return Err(TransitionRejection::SkippedLevel {
            target: definition.id.clone(),
            level: definition.level,
            depth,
        });
    }

    let keep = level - 1;
    if keep > 0 {
        let below = stack.entries().get(keep - 1);
        if definition.parent.as_ref() != below {
            return Err(TransitionRejection::ParentMismatch {
                target: definition.id.clone(),
                expected: definition.parent.clone(),
                actual: below.cloned(),
            });
        }
    }

    Ok(TransitionPlan::Push { keep })
}

pub fn check_invariants(
    entries: &[StateId],
    config: &DialogConfig,
) -> Result<(), StackInvariantError> {
    for (index, state) in entries.iter().enumerate() {
        let definition =
            config
                .get(state.as_str())
                .ok_or_else(|| StackInvariantError::UnknownState {
                    index,
                    state: state.clone(),
                })?;
        let expected = index as u32 + 1;
        if definition.level != expected {
            return Err(StackInvariantError::LevelMismatch {
                index,
                state: state.clone(),
                expected,
                actual: definition.level,
            });
        }

        if index == 0 {
            let detached = definition.parent.as_ref().is_some_and(|parent| {
                config
                    .get(parent.as_str())
                    .map_or(true, |parent| !parent.is_root_screen())
            });
            if detached {
                return Err(StackInvariantError::DetachedBottom {
                    state: state.clone(),
                });
            }
        } else if definition.parent.as_ref() != entries.get(index - 1) {
            return Err(StackInvariantError::ParentMismatch {
                index,
                state: state.clone(),
            });
        }
    }
    Ok(())
}
