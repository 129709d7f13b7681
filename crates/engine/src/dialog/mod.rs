//! Declarative dialog and screen navigation.
//!
//! A validated [`DialogConfig`] describes every state; [`DialogEngine`] keeps the
//! navigation stack consistent with it and dispatches button actions to handlers
//! registered against the host game state.

mod action;
mod config;
mod content;
mod engine;
mod scheduler;
mod service;
mod snapshot;
mod stack;

pub use action::{ActionError, ActionParseError, ActionRegistry, DialogAction, RegistryError};
pub use config::{
    ButtonDef, ButtonStyle, ConfigError, DialogConfig, StateContent, StateDefinition,
    StateEventDef, StateId, StateKind, TransitionSpec,
};
pub use content::{
    data_i64, data_str, ContentError, ContentTemplates, RenderedButton, RenderedDialog,
    CONTENT_FALLBACK_MESSAGE,
};
pub use engine::{
    ActionContext, DataRetention, DialogCore, DialogEngine, DialogEngineBuilder, DialogEvent,
    EngineBuildError, ScreenLayer, MAX_PENDING_EVENTS,
};
pub use scheduler::ScheduledTaskId;
pub use service::DialogService;
pub use snapshot::{NavigationSnapshot, RestoreError, NAV_SNAPSHOT_VERSION};
pub use stack::{
    check_invariants, plan_transition, NavigationStack, StackInvariantError, TransitionPlan,
    TransitionRejection,
};
