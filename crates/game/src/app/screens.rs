use std::collections::BTreeSet;

use cyberops_engine::{DialogConfig, ScreenLayer, StateId};
use serde_json::Value;
use tracing::{debug, warn};

const MAX_SCREEN_HISTORY: usize = 32;

/// Root-screen router: remembers the active screen and the ones before it.
#[derive(Debug, Clone, Default)]
pub(crate) struct ScreenRouter {
    known: BTreeSet<StateId>,
    current: Option<StateId>,
    history: Vec<StateId>,
}

impl ScreenRouter {
    pub(crate) fn from_config(config: &DialogConfig) -> Self {
        Self {
            known: config
                .states()
                .iter()
                .filter(|state| state.is_root_screen())
                .map(|state| state.id.clone())
                .collect(),
            current: None,
            history: Vec::new(),
        }
    }

    #[cfg(test)]
    pub(crate) fn history(&self) -> &[StateId] {
        &self.history
    }
}

impl ScreenLayer for ScreenRouter {
    fn current_screen(&self) -> Option<StateId> {
        self.current.clone()
    }

    fn navigate_to(&mut self, screen: &StateId, params: Option<&Value>) -> bool {
        if !self.known.contains(screen) {
            warn!(screen = %screen, "screen_unknown");
            return false;
        }
        if let Some(previous) = self.current.replace(screen.clone()) {
            if self.history.len() == MAX_SCREEN_HISTORY {
                self.history.remove(0);
            }
            self.history.push(previous);
        }
        debug!(screen = %screen, has_params = params.is_some(), "screen_entered");
        true
    }
}
