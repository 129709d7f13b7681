use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::action::{ActionRegistry, DialogAction};
use super::config::{DialogConfig, StateDefinition, StateEventDef, StateId};
use super::content::{ContentTemplates, RenderedDialog};
use super::scheduler::{NavigationScheduler, ScheduledTaskId};
use super::snapshot::{NavigationSnapshot, RestoreError, NAV_SNAPSHOT_VERSION};
use super::stack::{check_invariants, plan_transition, NavigationStack, TransitionPlan};

pub const MAX_PENDING_EVENTS: usize = 256;

/// What happens to a state's bound data when its entry leaves the stack.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DataRetention {
    #[default]
    Retain,
    ClearOnClose,
}

/// Owner of level-0 screens. The dialog stack never holds them.
pub trait ScreenLayer {
    fn current_screen(&self) -> Option<StateId>;
    fn navigate_to(&mut self, screen: &StateId, params: Option<&Value>) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogEvent {
    Opened(RenderedDialog),
    Refreshed(RenderedDialog),
    Closed(StateId),
    ScreenRequested(StateId),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineBuildError {
    #[error("dialog config references unregistered action handlers: {}", names.join(", "))]
    MissingActionHandlers { names: Vec<String> },
    #[error("dialog config references unregistered content templates: {}", names.join(", "))]
    MissingTemplates { names: Vec<String> },
}

/// Navigation state shared by the engine and action handlers.
pub struct DialogCore {
    config: DialogConfig,
    templates: ContentTemplates,
    stack: NavigationStack,
    state_data: HashMap<StateId, Value>,
    retention: DataRetention,
    screen_layer: Option<Box<dyn ScreenLayer>>,
    scheduler: NavigationScheduler,
    pending_events: VecDeque<DialogEvent>,
}

impl DialogCore {
    pub fn config(&self) -> &DialogConfig {
        &self.config
    }

    pub fn stack(&self) -> &[StateId] {
        self.stack.entries()
    }

    pub fn depth(&self) -> usize {
        self.stack.depth()
    }

    pub fn is_open(&self) -> bool {
        !self.stack.is_empty()
    }

    pub fn current_state(&self) -> Option<&StateId> {
        self.stack.top()
    }

    /// Top of the stack, or the active screen when no dialog is open.
    pub fn current_location(&self) -> Option<StateId> {
        match self.stack.top() {
            Some(top) => Some(top.clone()),
            None => self
                .screen_layer
                .as_ref()
                .and_then(|layer| layer.current_screen()),
        }
    }

    pub fn has_state(&self, id: &str) -> bool {
        self.config.contains(id)
    }

    pub fn retention(&self) -> DataRetention {
        self.retention
    }

    pub fn set_retention(&mut self, retention: DataRetention) {
        self.retention = retention;
    }

    pub fn screen_layer(&self) -> Option<&dyn ScreenLayer> {
        self.screen_layer.as_deref()
    }

    pub fn state_data(&self, id: &str) -> Option<&Value> {
        self.state_data.get(id)
    }

    /// Binds data to a declared state without navigating.
    pub fn set_state_data(&mut self, id: &str, data: Value) -> bool {
        let Some(definition) = self.config.get(id) else {
            warn!(state = id, "state_data_unknown_state");
            return false;
        };
        self.state_data.insert(definition.id.clone(), data);
        true
    }

    pub fn clear_state_data(&mut self, id: &str) -> Option<Value> {
        self.state_data.remove(id)
    }

    pub fn navigate_to(&mut self, id: &str, data: Option<Value>, refresh: bool) -> bool {
        let plan = match plan_transition(&self.stack, &self.config, id, refresh) {
            Ok(plan) => plan,
            Err(rejection) => {
                warn!(
                    target_state = id,
                    depth = self.stack.depth(),
                    reason = %rejection,
                    "transition_rejected"
                );
                return false;
            }
        };
        let Some(definition) = self.config.get(id) else {
            return false;
        };
        let state = definition.id.clone();

        match plan {
            TransitionPlan::Unchanged => true,
            TransitionPlan::Refresh => {
                if let Some(data) = data {
                    self.state_data.insert(state.clone(), data);
                }
                if let Some(rendered) = self.render(&state) {
                    debug!(state = %state, "dialog_refreshed");
                    self.push_event(DialogEvent::Refreshed(rendered));
                }
                true
            }
            TransitionPlan::Screen => self.enter_screen(state, data),
            TransitionPlan::Push { keep } => {
                let removed = self.stack.truncate(keep);
                self.release_entries(removed);
                if let Some(data) = data {
                    self.state_data.insert(state.clone(), data);
                }
                self.stack.push(state.clone());
                info!(
                    state = %state,
                    level = self.stack.depth(),
                    "dialog_opened"
                );
                if let Some(rendered) = self.render(&state) {
                    self.push_event(DialogEvent::Opened(rendered));
                }
                self.schedule_state_events(&state);
                self.settle_timers();
                true
            }
        }
    }

    pub fn back(&mut self) -> bool {
        let Some(popped) = self.stack.pop() else {
            debug!("dialog_back_on_empty_stack");
            return false;
        };
        self.release_entries(vec![popped]);
        self.settle_timers();
        true
    }

    pub fn close(&mut self) -> bool {
        if self.stack.is_empty() {
            debug!("dialog_close_on_empty_stack");
            return false;
        }
        let keep = self.stack.close_keep_len(&self.config);
        let removed = self.stack.truncate(keep);
        self.release_entries(removed);
        self.settle_timers();
        true
    }

    pub fn close_all(&mut self) -> bool {
        let removed = self.stack.truncate(0);
        self.release_entries(removed);
        self.settle_timers();
        true
    }

    /// Queues a navigation that fires from a later [`DialogCore::update`].
    pub fn schedule_navigation(&mut self, delay: Duration, target: &str) -> Option<ScheduledTaskId> {
        let Some(definition) = self.config.get(target) else {
            warn!(target_state = target, "schedule_unknown_state");
            return None;
        };
        let id = self
            .scheduler
            .schedule(delay, definition.id.clone(), None);
        debug!(task = %id, target_state = target, delay_ms = delay.as_millis() as u64, "navigation_scheduled");
        Some(id)
    }

    pub fn cancel_scheduled(&mut self, id: ScheduledTaskId) -> bool {
        self.scheduler.cancel(id)
    }

    pub fn pending_task_count(&self) -> usize {
        self.scheduler.len()
    }

    pub fn update(&mut self, dt: Duration) {
        for due in self.scheduler.advance(dt) {
            if let Some(origin) = &due.origin {
                if self.current_location().as_ref() != Some(origin) {
                    debug!(task = %due.id, origin = %origin, "scheduled_navigation_superseded");
                    continue;
                }
            }
            debug!(task = %due.id, target_state = %due.target, "scheduled_navigation_fired");
            self.navigate_to(due.target.as_str(), None, false);
        }
    }

    pub fn current_render(&self) -> Option<RenderedDialog> {
        let location = self.current_location()?;
        self.render(&location)
    }

    pub fn drain_events_into(&mut self, out: &mut Vec<DialogEvent>) {
        out.extend(self.pending_events.drain(..));
    }

    pub fn pending_event_count(&self) -> usize {
        self.pending_events.len()
    }

    pub fn snapshot(&self) -> NavigationSnapshot {
        NavigationSnapshot {
            version: NAV_SNAPSHOT_VERSION,
            config_fingerprint: self.config.fingerprint().to_string(),
            stack: self.stack.entries().to_vec(),
            state_data: self
                .state_data
                .iter()
                .map(|(id, value)| (id.clone(), value.clone()))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    /// Replaces the stack and bound data. Nothing changes unless the snapshot is valid.
    pub fn restore(&mut self, snapshot: NavigationSnapshot) -> Result<(), RestoreError> {
        if snapshot.version != NAV_SNAPSHOT_VERSION {
            return Err(RestoreError::Version {
                found: snapshot.version,
                expected: NAV_SNAPSHOT_VERSION,
            });
        }
        if snapshot.config_fingerprint != self.config.fingerprint() {
            return Err(RestoreError::ConfigChanged {
                found: snapshot.config_fingerprint,
                expected: self.config.fingerprint().to_string(),
            });
        }
        if let Some(unknown) = snapshot
            .state_data
            .keys()
            .find(|id| !self.config.contains(id.as_str()))
        {
            return Err(RestoreError::UnknownDataState {
                state: unknown.clone(),
            });
        }
        check_invariants(&snapshot.stack, &self.config)?;

        let removed = self.stack.replace(snapshot.stack);
        for state in removed {
            self.push_event(DialogEvent::Closed(state));
        }
        self.state_data = snapshot.state_data.into_iter().collect();
        self.scheduler.clear();
        if let Some(top) = self.stack.top().cloned() {
            if let Some(rendered) = self.render(&top) {
                self.push_event(DialogEvent::Opened(rendered));
            }
        }
        info!(depth = self.stack.depth(), "navigation_restored");
        Ok(())
    }

    pub(crate) fn button_action(&self, index: usize) -> Option<(StateId, DialogAction, bool)> {
        let location = self.current_location()?;
        let definition = self.config.get(location.as_str())?;
        let button = definition.buttons.get(index)?;
        Some((location, button.action.clone(), button.style.disabled))
    }

    fn enter_screen(&mut self, screen: StateId, data: Option<Value>) -> bool {
        if self.screen_layer.is_none() {
            warn!(screen = %screen, "screen_layer_missing");
            return false;
        }
        let removed = self.stack.truncate(0);
        self.release_entries(removed);
        if let Some(data) = data {
            self.state_data.insert(screen.clone(), data);
        }

        let params = self.state_data.get(&screen).cloned();
        let accepted = match self.screen_layer.as_mut() {
            Some(layer) => layer.navigate_to(&screen, params.as_ref()),
            None => false,
        };
        if !accepted {
            warn!(screen = %screen, "screen_navigation_refused");
            self.settle_timers();
            return false;
        }

        info!(screen = %screen, "screen_requested");
        self.push_event(DialogEvent::ScreenRequested(screen.clone()));
        self.schedule_state_events(&screen);
        self.settle_timers();
        true
    }

    fn release_entries(&mut self, removed: Vec<StateId>) {
        for state in removed {
            debug!(state = %state, "dialog_closed");
            if self.retention == DataRetention::ClearOnClose {
                self.state_data.remove(&state);
            }
            self.push_event(DialogEvent::Closed(state));
        }
    }

    fn schedule_state_events(&mut self, state: &StateId) {
        let Some(definition) = self.config.get(state.as_str()) else {
            return;
        };
        for event in &definition.events {
            let StateEventDef::Timer { delay_ms, target } = event;
            self.scheduler.schedule(
                Duration::from_millis(*delay_ms),
                target.clone(),
                Some(state.clone()),
            );
        }
    }

    fn settle_timers(&mut self) {
        let current = self.current_location();
        let cancelled = self.scheduler.cancel_foreign(current.as_ref());
        if cancelled > 0 {
            debug!(cancelled, "state_timers_cancelled");
        }
    }

    fn render(&self, state: &StateId) -> Option<RenderedDialog> {
        let definition: &StateDefinition = self.config.get(state.as_str())?;
        Some(
            self.templates
                .render(definition, self.state_data.get(state)),
        )
    }

    fn push_event(&mut self, event: DialogEvent) {
        if self.pending_events.len() == MAX_PENDING_EVENTS {
            self.pending_events.pop_front();
        }
        self.pending_events.push_back(event);
    }
}

/// Capabilities handed to an action handler for one dispatch.
pub struct ActionContext<'a, H> {
    core: &'a mut DialogCore,
    host: &'a mut H,
}

impl<'a, H> ActionContext<'a, H> {
    pub fn host(&self) -> &H {
        &*self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut *self.host
    }

    pub fn navigate_to(&mut self, id: &str, data: Option<Value>, refresh: bool) -> bool {
        self.core.navigate_to(id, data, refresh)
    }

    pub fn back(&mut self) -> bool {
        self.core.back()
    }

    pub fn close(&mut self) -> bool {
        self.core.close()
    }

    pub fn close_all(&mut self) -> bool {
        self.core.close_all()
    }

    pub fn current_state(&self) -> Option<&StateId> {
        self.core.current_state()
    }

    /// Screen currently shown under the dialog stack.
    pub fn current_screen(&self) -> Option<StateId> {
        self.core
            .screen_layer()
            .and_then(|layer| layer.current_screen())
    }

    pub fn state_data(&self, id: &str) -> Option<&Value> {
        self.core.state_data(id)
    }

    pub fn current_state_data(&self) -> Option<&Value> {
        let location = self.core.current_location()?;
        self.core.state_data(location.as_str())
    }

    pub fn set_state_data(&mut self, id: &str, data: Value) -> bool {
        self.core.set_state_data(id, data)
    }

    pub fn schedule_navigation(&mut self, delay: Duration, target: &str) -> Option<ScheduledTaskId> {
        self.core.schedule_navigation(delay, target)
    }

    pub fn snapshot(&self) -> NavigationSnapshot {
        self.core.snapshot()
    }

    pub fn restore(&mut self, snapshot: NavigationSnapshot) -> Result<(), RestoreError> {
        self.core.restore(snapshot)
    }
}

pub struct DialogEngineBuilder<H> {
    config: DialogConfig,
    templates: ContentTemplates,
    actions: ActionRegistry<H>,
    retention: DataRetention,
    screen_layer: Option<Box<dyn ScreenLayer>>,
}

impl<H> DialogEngineBuilder<H> {
    pub fn new(config: DialogConfig) -> Self {
        Self {
            config,
            templates: ContentTemplates::new(),
            actions: ActionRegistry::new(),
            retention: DataRetention::default(),
            screen_layer: None,
        }
    }

    pub fn templates(mut self, templates: ContentTemplates) -> Self {
        self.templates = templates;
        self
    }

    pub fn actions(mut self, actions: ActionRegistry<H>) -> Self {
        self.actions = actions;
        self
    }

    pub fn retention(mut self, retention: DataRetention) -> Self {
        self.retention = retention;
        self
    }

    pub fn screen_layer(mut self, layer: impl ScreenLayer + 'static) -> Self {
        self.screen_layer = Some(Box::new(layer));
        self
    }

    pub fn build(self) -> Result<DialogEngine<H>, EngineBuildError> {
        let mut missing_actions: Vec<String> = self
            .config
            .declared_actions()
            .filter_map(|(_, action)| action.handler_name())
            .filter(|name| !self.actions.contains(name))
            .map(ToString::to_string)
            .collect();
        missing_actions.sort();
        missing_actions.dedup();
        if !missing_actions.is_empty() {
            return Err(EngineBuildError::MissingActionHandlers {
                names: missing_actions,
            });
        }

        let mut missing_templates: Vec<String> = self
            .config
            .declared_templates()
            .filter(|(_, name)| !self.templates.contains(name))
            .map(|(_, name)| name.to_string())
            .collect();
        missing_templates.sort();
        missing_templates.dedup();
        if !missing_templates.is_empty() {
            return Err(EngineBuildError::MissingTemplates {
                names: missing_templates,
            });
        }

        info!(
            states = self.config.len(),
            actions = self.actions.len(),
            fingerprint = %self.config.fingerprint(),
            "dialog_engine_built"
        );
        Ok(DialogEngine {
            core: DialogCore {
                config: self.config,
                templates: self.templates,
                stack: NavigationStack::new(),
                state_data: HashMap::new(),
                retention: self.retention,
                screen_layer: self.screen_layer,
                scheduler: NavigationScheduler::default(),
                pending_events: VecDeque::new(),
            },
            actions: self.actions,
        })
    }
}

/// Stack-based dialog router over a validated [`DialogConfig`].
///
/// `H` is the host game state that action handlers mutate.
pub struct DialogEngine<H> {
    core: DialogCore,
    actions: ActionRegistry<H>,
}

impl<H> DialogEngine<H> {
    pub fn builder(config: DialogConfig) -> DialogEngineBuilder<H> {
        DialogEngineBuilder::new(config)
    }

    pub fn core(&self) -> &DialogCore {
        &self.core
    }

    pub fn core_mut(&mut self) -> &mut DialogCore {
        &mut self.core
    }

    pub fn actions(&self) -> &ActionRegistry<H> {
        &self.actions
    }

    pub fn navigate_to(&mut self, id: &str, data: Option<Value>, refresh: bool) -> bool {
        self.core.navigate_to(id, data, refresh)
    }

    pub fn back(&mut self) -> bool {
        self.core.back()
    }

    pub fn close(&mut self) -> bool {
        self.core.close()
    }

    pub fn close_all(&mut self) -> bool {
        self.core.close_all()
    }

    pub fn current_state(&self) -> Option<&StateId> {
        self.core.current_state()
    }

    pub fn is_open(&self) -> bool {
        self.core.is_open()
    }

    pub fn stack(&self) -> &[StateId] {
        self.core.stack()
    }

    pub fn depth(&self) -> usize {
        self.core.depth()
    }

    pub fn has_state(&self, id: &str) -> bool {
        self.core.has_state(id)
    }

    pub fn state_data(&self, id: &str) -> Option<&Value> {
        self.core.state_data(id)
    }

    pub fn set_state_data(&mut self, id: &str, data: Value) -> bool {
        self.core.set_state_data(id, data)
    }

    pub fn clear_state_data(&mut self, id: &str) -> Option<Value> {
        self.core.clear_state_data(id)
    }

    pub fn update(&mut self, dt: Duration) {
        self.core.update(dt);
    }

    pub fn schedule_navigation(&mut self, delay: Duration, target: &str) -> Option<ScheduledTaskId> {
        self.core.schedule_navigation(delay, target)
    }

    pub fn cancel_scheduled(&mut self, id: ScheduledTaskId) -> bool {
        self.core.cancel_scheduled(id)
    }

    pub fn current_render(&self) -> Option<RenderedDialog> {
        self.core.current_render()
    }

    pub fn drain_events_into(&mut self, out: &mut Vec<DialogEvent>) {
        self.core.drain_events_into(out);
    }

    pub fn snapshot(&self) -> NavigationSnapshot {
        self.core.snapshot()
    }

    pub fn restore(&mut self, snapshot: NavigationSnapshot) -> Result<(), RestoreError> {
        self.core.restore(snapshot)
    }

    /// Parses and dispatches a textual action. Failures are logged and return false.
    pub fn execute_action(&mut self, raw: &str, host: &mut H) -> bool {
        match raw.parse::<DialogAction>() {
            Ok(action) => self.dispatch(&action, host),
            Err(error) => {
                warn!(action = raw, error = %error, "dialog_action_invalid");
                false
            }
        }
    }

    pub fn dispatch(&mut self, action: &DialogAction, host: &mut H) -> bool {
        match action {
            DialogAction::Close => self.core.close(),
            DialogAction::Back => self.core.back(),
            DialogAction::CloseAll => self.core.close_all(),
            DialogAction::Navigate(target) => self.core.navigate_to(target.as_str(), None, false),
            DialogAction::Execute { name, args } => {
                let Some(handler) = self.actions.handler_mut(name) else {
                    warn!(action = %name, "dialog_action_unknown");
                    return false;
                };
                let mut ctx = ActionContext {
                    core: &mut self.core,
                    host,
                };
                match handler(&mut ctx, args.as_slice()) {
                    Ok(()) => {
                        debug!(action = %name, "dialog_action_executed");
                        true
                    }
                    Err(error) => {
                        warn!(action = %name, error = %error, "dialog_action_failed");
                        false
                    }
                }
            }
        }
    }

    /// Dispatches the action bound to button `index` of the current state or screen.
    pub fn press_button(&mut self, index: usize, host: &mut H) -> bool {
        let Some((state, action, disabled)) = self.core.button_action(index) else {
            warn!(button = index, "dialog_button_missing");
            return false;
        };
        if disabled {
            debug!(state = %state, button = index, "dialog_button_disabled");
            return false;
        }
        self.dispatch(&action, host)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use serde_json::json;

    use super::*;
    use crate::dialog::{
        ActionError, ButtonStyle, StateContent, StateKind, CONTENT_FALLBACK_MESSAGE,
    };

    #[derive(Default)]
    struct Host {
        saved_slots: Vec<String>,
    }

    #[derive(Clone, Default)]
    struct RecordingScreens {
        current: Rc<RefCell<Option<StateId>>>,
        refuse: bool,
    }

    impl ScreenLayer for RecordingScreens {
        fn current_screen(&self) -> Option<StateId> {
            self.current.borrow().clone()
        }

        fn navigate_to(&mut self, screen: &StateId, _params: Option<&Value>) -> bool {
            if self.refuse {
                return false;
            }
            *self.current.borrow_mut() = Some(screen.clone());
            true
        }
    }

    fn states() -> Vec<StateDefinition> {
        let mut disabled = StateDefinition::new("locked", StateKind::Dialog, 1)
            .with_button("Nope", DialogAction::execute("save-game"));
        disabled.buttons[0].style = ButtonStyle {
            disabled: true,
            ..ButtonStyle::default()
        };
        vec![
            StateDefinition::new("splash", StateKind::Screen, 0).with_timer(3000, "main-menu"),
            StateDefinition::new("main-menu", StateKind::Screen, 0)
                .with_button("Settings", DialogAction::Navigate(StateId::from("settings-root"))),
            StateDefinition::new("game", StateKind::Screen, 0),
            StateDefinition::new("pause-menu", StateKind::Dialog, 1)
                .with_parent("game")
                .with_title("Paused")
                .with_button("Settings", DialogAction::Navigate(StateId::from("settings")))
                .with_button("Save", DialogAction::Execute {
                    name: "save-game".to_string(),
                    args: vec!["slot-1".to_string()],
                })
                .with_button("Resume", DialogAction::Close),
            StateDefinition::new("settings", StateKind::Dialog, 2)
                .with_parent("pause-menu")
                .with_button("Back", DialogAction::Back),
            StateDefinition::new("audio", StateKind::Dialog, 3).with_parent("settings"),
            StateDefinition::new("settings-root", StateKind::Dialog, 1),
            StateDefinition::new("roster", StateKind::Screen, 1),
            StateDefinition::new("agent", StateKind::Dialog, 2)
                .with_parent("roster")
                .with_content(StateContent::Template("agent".to_string())),
            StateDefinition::new("mission-brief", StateKind::Dialog, 1)
                .with_timer(500, "roster"),
            disabled,
        ]
    }

    fn templates() -> ContentTemplates {
        let mut templates = ContentTemplates::new();
        templates.register("agent", |_definition, data| {
            Ok(crate::dialog::data_str(data, "name")?.to_string())
        });
        templates
    }

    fn actions() -> ActionRegistry<Host> {
        let mut actions: ActionRegistry<Host> = ActionRegistry::new();
        actions
            .register("save-game", "Save to a slot", |ctx, args| {
                let slot = args
                    .first()
                    .cloned()
                    .ok_or_else(|| ActionError::new("missing slot"))?;
                ctx.host_mut().saved_slots.push(slot);
                ctx.close_all();
                Ok(())
            })
            .expect("register");
        actions
    }

    fn engine_with(screens: RecordingScreens) -> DialogEngine<Host> {
        DialogEngine::builder(DialogConfig::new(states()).expect("config"))
            .templates(templates())
            .actions(actions())
            .screen_layer(screens)
            .build()
            .expect("engine")
    }

    fn engine() -> DialogEngine<Host> {
        engine_with(RecordingScreens::default())
    }

    fn ids(engine: &DialogEngine<Host>) -> Vec<&str> {
        engine.stack().iter().map(StateId::as_str).collect()
    }

    fn assert_invariants(engine: &DialogEngine<Host>) {
        check_invariants(engine.stack(), engine.core().config()).expect("stack invariants");
    }

    #[test]
    fn pause_settings_back_returns_to_pause_menu() {
        let mut engine = engine();
        assert!(engine.navigate_to("pause-menu", None, false));
        assert!(engine.navigate_to("settings", None, false));
        assert_eq!(engine.depth(), 2);
        assert!(engine.back());
        assert_eq!(engine.current_state().map(StateId::as_str), Some("pause-menu"));
        assert_eq!(engine.depth(), 1);
    }

    #[test]
    fn shallower_target_replaces_the_whole_chain() {
        let mut engine = engine();
        engine.navigate_to("pause-menu", None, false);
        engine.navigate_to("settings", None, false);
        engine.navigate_to("audio", None, false);
        assert_eq!(engine.depth(), 3);
        assert!(engine.navigate_to("roster", None, false));
        assert_eq!(ids(&engine), vec!["roster"]);
    }

    #[test]
    fn refresh_rebinds_data_without_changing_depth() {
        let mut engine = engine();
        engine.navigate_to("roster", None, false);
        engine.navigate_to("agent", Some(json!({ "name": "Vex" })), false);
        let mut events = Vec::new();
        engine.drain_events_into(&mut events);

        assert!(engine.navigate_to("agent", Some(json!({ "name": "Kade" })), true));
        assert_eq!(engine.depth(), 2);
        assert_eq!(engine.state_data("agent"), Some(&json!({ "name": "Kade" })));
        events.clear();
        engine.drain_events_into(&mut events);
        match events.as_slice() {
            [DialogEvent::Refreshed(rendered)] => assert_eq!(rendered.body, "Kade"),
            other => panic!("unexpected events: {other:?}"),
        }
    }

    #[test]
    fn same_state_without_refresh_is_a_no_op() {
        let mut engine = engine();
        engine.navigate_to("pause-menu", None, false);
        let mut events = Vec::new();
        engine.drain_events_into(&mut events);
        assert!(engine.navigate_to("pause-menu", Some(json!(1)), false));
        assert_eq!(engine.depth(), 1);
        assert_eq!(engine.core().pending_event_count(), 0);
        assert_eq!(engine.state_data("pause-menu"), None);
    }

    #[test]
    fn back_and_close_on_empty_stack_report_false() {
        let mut engine = engine();
        assert!(!engine.back());
        assert!(!engine.close());
        assert!(engine.stack().is_empty());
    }

    #[test]
    fn close_all_is_idempotent() {
        let mut engine = engine();
        assert!(engine.close_all());
        assert!(engine.close_all());
        engine.navigate_to("pause-menu", None, false);
        engine.navigate_to("settings", None, false);
        assert!(engine.close_all());
        assert!(!engine.is_open());
    }

    #[test]
    fn close_stops_at_nearest_screen_entry() {
        let mut engine = engine();
        engine.navigate_to("roster", None, false);
        engine.navigate_to("agent", Some(json!({ "name": "Vex" })), false);
        assert!(engine.close());
        assert_eq!(ids(&engine), vec!["roster"]);
        assert!(engine.close());
        assert!(engine.stack().is_empty());
    }

    #[test]
    fn invalid_transitions_are_rejected_without_mutation() {
        let mut engine = engine();
        assert!(!engine.navigate_to("nowhere", None, false));
        assert!(!engine.navigate_to("settings", Some(json!(1)), false));
        assert!(engine.stack().is_empty());
        assert_eq!(engine.state_data("settings"), None);

        engine.navigate_to("roster", None, false);
        assert!(!engine.navigate_to("settings", None, false));
        assert_eq!(ids(&engine), vec!["roster"]);
    }

    #[test]
    fn invariants_hold_across_mixed_sequences() {
        let mut engine = engine();
        let script: &[&str] = &[
            "pause-menu", "settings", "audio", "agent", "back", "roster", "agent", "close",
            "settings", "pause-menu", "settings", "close-all", "audio", "settings-root",
            "back", "back", "mission-brief", "pause-menu", "settings", "audio", "back",
        ];
        for step in script {
            match *step {
                "back" => {
                    engine.back();
                }
                "close" => {
                    engine.close();
                }
                "close-all" => {
                    engine.close_all();
                }
                id => {
                    engine.navigate_to(id, None, false);
                }
            }
            assert_invariants(&engine);
            let top_level = engine
                .current_state()
                .and_then(|id| engine.core().config().get(id.as_str()))
                .map_or(0, |definition| definition.level as usize);
            assert_eq!(engine.depth(), top_level);
        }
    }

    #[test]
    fn root_screen_closes_dialogs_and_routes_through_screen_layer() {
        let screens = RecordingScreens::default();
        let mut engine = engine_with(screens.clone());
        engine.navigate_to("pause-menu", None, false);
        assert!(engine.navigate_to("game", Some(json!({ "mission": 2 })), false));
        assert!(engine.stack().is_empty());
        assert_eq!(screens.current_screen(), Some(StateId::from("game")));

        let mut events = Vec::new();
        engine.drain_events_into(&mut events);
        assert!(events.contains(&DialogEvent::Closed(StateId::from("pause-menu"))));
        assert_eq!(
            events.last(),
            Some(&DialogEvent::ScreenRequested(StateId::from("game")))
        );
    }

    #[test]
    fn root_screen_without_screen_layer_is_refused() {
        let mut engine = DialogEngine::<Host>::builder(DialogConfig::new(states()).expect("config"))
            .templates(templates())
            .actions(actions())
            .build()
            .expect("engine");
        engine.navigate_to("pause-menu", None, false);
        assert!(!engine.navigate_to("game", None, false));
        assert_eq!(ids(&engine), vec!["pause-menu"]);
    }

    #[test]
    fn execute_action_runs_handler_with_host_and_navigation() {
        let mut engine = engine();
        let mut host = Host::default();
        engine.navigate_to("pause-menu", None, false);
        assert!(engine.press_button(1, &mut host));
        assert_eq!(host.saved_slots, vec!["slot-1".to_string()]);
        assert!(engine.stack().is_empty());
    }

    #[test]
    fn unknown_and_failing_actions_report_false() {
        let mut engine = engine();
        let mut host = Host::default();
        engine.navigate_to("pause-menu", None, false);
        assert!(!engine.execute_action("execute:launch-nukes", &mut host));
        assert!(!engine.execute_action("save-game", &mut host));
        assert!(!engine.execute_action("", &mut host));
        assert_eq!(ids(&engine), vec!["pause-menu"]);
        assert!(host.saved_slots.is_empty());
    }

    #[test]
    fn builtin_actions_drive_the_stack() {
        let mut engine = engine();
        let mut host = Host::default();
        engine.navigate_to("pause-menu", None, false);
        assert!(engine.press_button(0, &mut host));
        assert_eq!(ids(&engine), vec!["pause-menu", "settings"]);
        assert!(engine.press_button(0, &mut host));
        assert_eq!(ids(&engine), vec!["pause-menu"]);
        assert!(engine.execute_action("close", &mut host));
        assert!(!engine.press_button(0, &mut host));
    }

    #[test]
    fn disabled_buttons_do_nothing() {
        let mut engine = engine();
        let mut host = Host::default();
        engine.navigate_to("locked", None, false);
        assert!(!engine.press_button(0, &mut host));
        assert!(host.saved_slots.is_empty());
    }

    #[test]
    fn screen_buttons_are_pressable_when_no_dialog_is_open() {
        let mut engine = engine();
        let mut host = Host::default();
        assert!(engine.navigate_to("main-menu", None, false));
        assert!(engine.press_button(0, &mut host));
        assert_eq!(ids(&engine), vec!["settings-root"]);
    }

    #[test]
    fn build_fails_when_handlers_or_templates_are_missing() {
        let config = DialogConfig::new(states()).expect("config");
        let err = DialogEngine::<Host>::builder(config.clone())
            .templates(templates())
            .build()
            .err();
        assert_eq!(
            err,
            Some(EngineBuildError::MissingActionHandlers {
                names: vec!["save-game".to_string()]
            })
        );

        let err = DialogEngine::<Host>::builder(config)
            .actions(actions())
            .build()
            .err();
        assert_eq!(
            err,
            Some(EngineBuildError::MissingTemplates {
                names: vec!["agent".to_string()]
            })
        );
    }

    #[test]
    fn failing_template_renders_fallback_content() {
        let mut engine = engine();
        engine.navigate_to("roster", None, false);
        engine.navigate_to("agent", None, false);
        let rendered = engine.current_render().expect("render");
        assert!(rendered.fallback);
        assert_eq!(rendered.body, CONTENT_FALLBACK_MESSAGE);
    }

    #[test]
    fn splash_timer_fires_only_from_update() {
        let screens = RecordingScreens::default();
        let mut engine = engine_with(screens.clone());
        assert!(engine.navigate_to("splash", None, false));
        assert_eq!(engine.core().pending_task_count(), 1);

        engine.update(Duration::from_millis(2999));
        assert_eq!(screens.current_screen(), Some(StateId::from("splash")));
        engine.update(Duration::from_millis(1));
        assert_eq!(screens.current_screen(), Some(StateId::from("main-menu")));
    }

    #[test]
    fn leaving_the_origin_state_cancels_its_timers() {
        let mut engine = engine();
        engine.navigate_to("mission-brief", None, false);
        assert_eq!(engine.core().pending_task_count(), 1);
        engine.close_all();
        assert_eq!(engine.core().pending_task_count(), 0);
        engine.update(Duration::from_secs(1));
        assert!(engine.stack().is_empty());
    }

    #[test]
    fn user_interaction_before_timer_wins() {
        let screens = RecordingScreens::default();
        let mut engine = engine_with(screens.clone());
        engine.navigate_to("splash", None, false);
        engine.navigate_to("game", None, false);
        engine.update(Duration::from_secs(5));
        assert_eq!(screens.current_screen(), Some(StateId::from("game")));
    }

    #[test]
    fn explicit_schedules_can_be_cancelled() {
        let mut engine = engine();
        let task = engine
            .schedule_navigation(Duration::from_millis(100), "pause-menu")
            .expect("task");
        assert!(engine.schedule_navigation(Duration::ZERO, "nowhere").is_none());
        assert!(engine.cancel_scheduled(task));
        engine.update(Duration::from_millis(200));
        assert!(engine.stack().is_empty());

        engine.schedule_navigation(Duration::from_millis(100), "pause-menu");
        engine.update(Duration::from_millis(100));
        assert_eq!(ids(&engine), vec!["pause-menu"]);
    }

    #[test]
    fn clear_on_close_drops_data_of_departed_states() {
        let mut engine = engine();
        engine.core_mut().set_retention(DataRetention::ClearOnClose);
        engine.navigate_to("roster", Some(json!({ "page": 1 })), false);
        engine.navigate_to("agent", Some(json!({ "name": "Vex" })), false);
        engine.back();
        assert_eq!(engine.state_data("agent"), None);
        assert_eq!(engine.state_data("roster"), Some(&json!({ "page": 1 })));
    }

    #[test]
    fn retained_data_survives_reopening() {
        let mut engine = engine();
        engine.navigate_to("roster", None, false);
        engine.navigate_to("agent", Some(json!({ "name": "Vex" })), false);
        engine.back();
        engine.navigate_to("agent", None, false);
        assert_eq!(engine.current_render().map(|render| render.body), Some("Vex".to_string()));
    }

    #[test]
    fn state_data_binds_only_to_declared_states() {
        let mut engine = engine();
        assert!(!engine.set_state_data("ghost", json!(1)));
        assert!(engine.set_state_data("settings", json!({ "tab": "audio" })));
        assert_eq!(engine.clear_state_data("settings"), Some(json!({ "tab": "audio" })));
    }

    #[test]
    fn event_queue_is_bounded() {
        let mut engine = engine();
        for _ in 0..MAX_PENDING_EVENTS {
            engine.navigate_to("pause-menu", None, false);
            engine.back();
        }
        assert_eq!(engine.core().pending_event_count(), MAX_PENDING_EVENTS);
    }

    #[test]
    fn snapshot_restores_stack_and_data() {
        let mut engine = engine();
        engine.navigate_to("roster", None, false);
        engine.navigate_to("agent", Some(json!({ "name": "Vex" })), false);
        let snapshot = engine.snapshot();

        let mut restored = self::engine();
        restored.restore(snapshot).expect("restore");
        assert_eq!(ids(&restored), vec!["roster", "agent"]);
        assert_eq!(restored.state_data("agent"), Some(&json!({ "name": "Vex" })));
    }

    #[test]
    fn invalid_snapshots_leave_engine_untouched() {
        let mut engine = engine();
        engine.navigate_to("pause-menu", None, false);

        let mut bad_stack = engine.snapshot();
        bad_stack.stack = vec![StateId::from("settings")];
        assert!(matches!(
            engine.restore(bad_stack),
            Err(RestoreError::Stack(_))
        ));

        let mut stale = engine.snapshot();
        stale.config_fingerprint = "0".repeat(64);
        assert!(matches!(
            engine.restore(stale),
            Err(RestoreError::ConfigChanged { .. })
        ));

        let mut future = engine.snapshot();
        future.version += 1;
        assert!(matches!(engine.restore(future), Err(RestoreError::Version { .. })));

        let mut ghost = engine.snapshot();
        ghost.state_data.insert(StateId::from("ghost"), json!(null));
        assert!(matches!(
            engine.restore(ghost),
            Err(RestoreError::UnknownDataState { .. })
        ));

        assert_eq!(ids(&engine), vec!["pause-menu"]);
    }

    #[test]
    fn refused_screen_navigation_reports_false() {
        let screens = RecordingScreens {
            refuse: true,
            ..RecordingScreens::default()
        };
        let mut engine = engine_with(screens);
        assert!(!engine.navigate_to("game", None, false));
    }
}
