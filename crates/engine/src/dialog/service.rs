use serde_json::Value;
use tracing::warn;

use super::config::StateId;
use super::engine::DialogEngine;

/// Injected handle to a [`DialogEngine`].
///
/// UI code holds the service; the engine is attached once bootstrap has built it.
/// Every call made while detached is logged and fails soft.
pub struct DialogService<H> {
    engine: Option<DialogEngine<H>>,
}

impl<H> Default for DialogService<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> DialogService<H> {
    pub fn new() -> Self {
        Self { engine: None }
    }

    pub fn with_engine(engine: DialogEngine<H>) -> Self {
        Self {
            engine: Some(engine),
        }
    }

    /// Returns the previously attached engine, if any.
    pub fn attach(&mut self, engine: DialogEngine<H>) -> Option<DialogEngine<H>> {
        self.engine.replace(engine)
    }

    pub fn detach(&mut self) -> Option<DialogEngine<H>> {
        self.engine.take()
    }

    pub fn is_attached(&self) -> bool {
        self.engine.is_some()
    }

    pub fn engine(&self) -> Option<&DialogEngine<H>> {
        self.engine.as_ref()
    }

    pub fn engine_mut(&mut self) -> Option<&mut DialogEngine<H>> {
        self.engine.as_mut()
    }

    pub fn navigate_to(&mut self, id: &str, data: Option<Value>, refresh: bool) -> bool {
        match self.attached_mut("navigate_to") {
            Some(engine) => engine.navigate_to(id, data, refresh),
            None => false,
        }
    }

    pub fn back(&mut self) -> bool {
        self.attached_mut("back").is_some_and(DialogEngine::back)
    }

    pub fn close(&mut self) -> bool {
        self.attached_mut("close").is_some_and(DialogEngine::close)
    }

    pub fn close_all(&mut self) -> bool {
        self.attached_mut("close_all")
            .is_some_and(DialogEngine::close_all)
    }

    pub fn current_state(&self) -> Option<&StateId> {
        self.engine.as_ref()?.current_state()
    }

    pub fn is_open(&self) -> bool {
        self.engine.as_ref().is_some_and(DialogEngine::is_open)
    }

    pub fn has_state(&self, id: &str) -> bool {
        self.engine
            .as_ref()
            .is_some_and(|engine| engine.has_state(id))
    }

    pub fn state_data(&self, id: &str) -> Option<&Value> {
        self.engine.as_ref()?.state_data(id)
    }

    pub fn set_state_data(&mut self, id: &str, data: Value) -> bool {
        match self.attached_mut("set_state_data") {
            Some(engine) => engine.set_state_data(id, data),
            None => false,
        }
    }

    pub fn execute_action(&mut self, raw: &str, host: &mut H) -> bool {
        match self.attached_mut("execute_action") {
            Some(engine) => engine.execute_action(raw, host),
            None => false,
        }
    }

    fn attached_mut(&mut self, operation: &'static str) -> Option<&mut DialogEngine<H>> {
        if self.engine.is_none() {
            warn!(operation, "dialog_service_detached");
        }
        self.engine.as_mut()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::dialog::{DialogConfig, StateDefinition, StateKind};

    fn engine() -> DialogEngine<()> {
        let config = DialogConfig::new(vec![
            StateDefinition::new("pause-menu", StateKind::Dialog, 1),
            StateDefinition::new("settings", StateKind::Dialog, 2).with_parent("pause-menu"),
        ])
        .expect("config");
        DialogEngine::builder(config).build().expect("engine")
    }

    #[test]
    fn detached_service_fails_soft() {
        let mut service = DialogService::<()>::new();
        assert!(!service.navigate_to("pause-menu", None, false));
        assert!(!service.back());
        assert!(!service.close());
        assert!(!service.close_all());
        assert!(!service.execute_action("close", &mut ()));
        assert_eq!(service.current_state(), None);
        assert!(!service.has_state("pause-menu"));
        assert!(!service.set_state_data("pause-menu", json!({ "slot": 1 })));
        assert_eq!(service.state_data("pause-menu"), None);
    }

    #[test]
    fn attached_service_forwards_to_engine() {
        let mut service = DialogService::new();
        assert!(service.attach(engine()).is_none());
        assert!(service.navigate_to("pause-menu", None, false));
        assert!(service.navigate_to("settings", None, false));
        assert!(service.back());
        assert_eq!(service.current_state().map(StateId::as_str), Some("pause-menu"));
        assert!(service.is_open());

        assert!(service.has_state("settings"));
        assert!(!service.has_state("inventory"));
        assert!(service.set_state_data("settings", json!({ "volume": 3 })));
        assert!(!service.set_state_data("inventory", json!({})));
        assert_eq!(service.state_data("settings"), Some(&json!({ "volume": 3 })));

        let detached = service.detach().expect("engine");
        assert_eq!(detached.depth(), 1);
        assert!(!service.is_attached());
    }
}
