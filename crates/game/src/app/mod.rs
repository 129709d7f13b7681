pub(crate) mod actions;
pub(crate) mod bootstrap;
pub(crate) mod console;
pub(crate) mod enemies;
pub(crate) mod loop_runner;
pub(crate) mod mission;
pub(crate) mod runtime;
pub(crate) mod screens;
pub(crate) mod session;
pub(crate) mod templates;
