use std::time::Duration;

use cyberops_engine::persist::{read_json, write_json_atomic};
use cyberops_engine::{
    DialogEngine, DialogEvent, DialogService, NavigationSnapshot, RenderedDialog, SettingValue,
    StateId,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::console::{ConsoleCommand, ConsoleCommandRegistry};
use super::session::GameSession;

/// What `persist` writes: the root screen plus the dialog stack above it.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ResumeRecord {
    #[serde(default)]
    screen: Option<StateId>,
    navigation: NavigationSnapshot,
}

/// Everything the console drives: the dialog service, the host game state and the
/// command registry.
pub(crate) struct GameApp {
    dialogs: DialogService<GameSession>,
    session: GameSession,
    console: ConsoleCommandRegistry,
    events: Vec<DialogEvent>,
}

impl GameApp {
    pub(crate) fn new(engine: DialogEngine<GameSession>, session: GameSession) -> Self {
        Self {
            dialogs: DialogService::with_engine(engine),
            session,
            console: ConsoleCommandRegistry::with_game_builtins(),
            events: Vec::new(),
        }
    }

    #[cfg(test)]
    pub(crate) fn session(&self) -> &GameSession {
        &self.session
    }

    #[cfg(test)]
    pub(crate) fn dialogs(&self) -> &DialogService<GameSession> {
        &self.dialogs
    }

    pub(crate) fn should_quit(&self) -> bool {
        self.session.quit_requested()
    }

    pub(crate) fn current_screen(&self) -> Option<String> {
        self.dialogs
            .engine()
            .and_then(|engine| engine.core().screen_layer())
            .and_then(|layer| layer.current_screen())
            .map(|screen| screen.to_string())
    }

    /// Resumes saved navigation, falling back to `initial_screen`.
    pub(crate) fn boot(&mut self, initial_screen: &str) -> Vec<String> {
        let mut output = Vec::new();
        let restored = match self.resume() {
            Ok(restored) => restored,
            Err(error) => {
                warn!(error = %error, "navigation_resume_failed");
                false
            }
        };
        if restored {
            output.push("navigation restored".to_string());
        } else if !self.dialogs.navigate_to(initial_screen, None, false) {
            warn!(screen = initial_screen, "initial_screen_refused");
        }
        self.flush(&mut output);
        output
    }

    /// Runs one console line and returns what should be printed.
    pub(crate) fn execute_line(&mut self, line: &str) -> Vec<String> {
        let mut output = Vec::new();
        match self.console.parse_line(line) {
            Ok(Some(command)) => self.apply_command(command, &mut output),
            Ok(None) => {}
            Err(message) => output.push(message),
        }
        self.flush(&mut output);
        output
    }

    /// Advances dialog timers and enemy movement.
    pub(crate) fn tick(&mut self, dt: Duration) -> Vec<String> {
        let mut output = Vec::new();
        if let Some(engine) = self.dialogs.engine_mut() {
            engine.update(dt);
        }
        self.session.enemies.advance(dt.as_secs_f32());
        self.flush(&mut output);
        output
    }

    /// Writes settings and the resume record to the cache directory.
    pub(crate) fn persist(&self) -> Result<(), String> {
        let settings_path = self.session.app_paths.settings_path();
        self.session
            .settings
            .save(&settings_path)
            .map_err(|error| error.to_string())?;

        let Some(engine) = self.dialogs.engine() else {
            return Err("dialog engine is not attached".to_string());
        };
        let record = ResumeRecord {
            screen: engine
                .core()
                .screen_layer()
                .and_then(|layer| layer.current_screen()),
            navigation: engine.snapshot(),
        };
        let record_path = self.session.app_paths.navigation_snapshot_path();
        write_json_atomic(&record_path, &record).map_err(|error| error.to_string())?;
        info!(
            path = %record_path.display(),
            screen = record.screen.as_ref().map_or("-", StateId::as_str),
            depth = record.navigation.stack.len(),
            "navigation_persisted"
        );
        Ok(())
    }

    /// Re-enters the saved screen and restores the dialog stack over it.
    /// `Ok(false)` when nothing was saved.
    pub(crate) fn resume(&mut self) -> Result<bool, String> {
        let path = self.session.app_paths.navigation_snapshot_path();
        let record = match read_json::<ResumeRecord>(&path) {
            Ok(record) => record,
            Err(error) if error.is_not_found() => return Ok(false),
            Err(error) => return Err(error.to_string()),
        };
        let Some(engine) = self.dialogs.engine_mut() else {
            return Err("dialog engine is not attached".to_string());
        };

        // No recorded screen: use the parent of the bottom entry.
        let screen = record.screen.clone().or_else(|| {
            record
                .navigation
                .stack
                .first()
                .and_then(|bottom| engine.core().config().get(bottom.as_str()))
                .and_then(|definition| definition.parent.clone())
        });
        if let Some(screen) = screen {
            let on_screen = engine
                .core()
                .screen_layer()
                .and_then(|layer| layer.current_screen())
                .is_some_and(|current| current == screen);
            if !on_screen && !engine.navigate_to(screen.as_str(), None, false) {
                return Err(format!("saved screen '{screen}' could not be entered"));
            }
        }
        engine
            .restore(record.navigation)
            .map_err(|error| error.to_string())?;
        Ok(true)
    }

    fn apply_command(&mut self, command: ConsoleCommand, output: &mut Vec<String>) {
        match command {
            ConsoleCommand::Help => output.extend(self.console.help_lines()),
            ConsoleCommand::Navigate {
                state,
                data,
                refresh,
            } => {
                if !self.dialogs.navigate_to(&state, data, refresh) {
                    output.push(format!("navigation to '{state}' was refused"));
                }
            }
            ConsoleCommand::Back => {
                if !self.dialogs.back() {
                    output.push("nothing to go back from".to_string());
                }
            }
            ConsoleCommand::Close => {
                if !self.dialogs.close() {
                    output.push("no dialog open".to_string());
                }
            }
            ConsoleCommand::CloseAll => {
                self.dialogs.close_all();
            }
            ConsoleCommand::Action { raw } => {
                if !self.dialogs.execute_action(&raw, &mut self.session) {
                    output.push(format!("action '{raw}' failed"));
                }
            }
            ConsoleCommand::Press { index } => {
                let pressed = match self.dialogs.engine_mut() {
                    Some(engine) => engine.press_button(index, &mut self.session),
                    None => false,
                };
                if !pressed {
                    output.push(format!("button {index} did nothing"));
                }
            }
            ConsoleCommand::Tick { millis } => {
                let lines = self.tick(Duration::from_millis(millis));
                output.extend(lines);
            }
            ConsoleCommand::Path { start, end, smooth } => {
                match self
                    .session
                    .pathfinder
                    .find_path(start.0, start.1, end.0, end.1, smooth)
                {
                    Ok(Some(path)) => output.push(format!(
                        "path ({} waypoints): {}",
                        path.len(),
                        path.iter()
                            .map(ToString::to_string)
                            .collect::<Vec<_>>()
                            .join(" -> ")
                    )),
                    Ok(None) => output.push("path: unreachable".to_string()),
                    Err(error) => output.push(format!("error: {error}")),
                }
            }
            ConsoleCommand::State => self.describe_state(output),
            ConsoleCommand::Enemies => {
                let mut any = false;
                for enemy in self.session.enemies.alive() {
                    any = true;
                    output.push(format!(
                        "{} {} at ({:.1}, {:.1}) hp {} route {}",
                        enemy.id,
                        enemy.kind,
                        enemy.position.x,
                        enemy.position.y,
                        enemy.health,
                        enemy.route().len()
                    ));
                }
                if !any {
                    output.push("no enemies deployed".to_string());
                }
            }
            ConsoleCommand::Set { key, value } => self.apply_setting(&key, value, output),
            ConsoleCommand::Persist => match self.persist() {
                Ok(()) => output.push("settings and navigation saved".to_string()),
                Err(error) => output.push(format!("error: {error}")),
            },
            ConsoleCommand::Resume => match self.resume() {
                Ok(true) => output.push("navigation restored".to_string()),
                Ok(false) => output.push("no saved navigation".to_string()),
                Err(error) => output.push(format!("error: {error}")),
            },
            ConsoleCommand::Quit => self.session.request_quit(),
        }
    }

    fn apply_setting(&mut self, key: &str, value: SettingValue, output: &mut Vec<String>) {
        match self.session.settings.set_value(key, value) {
            Ok(true) => {}
            Ok(false) => output.push(format!("setting {key} unchanged")),
            Err(error) => {
                output.push(format!("error: {error}"));
                return;
            }
        }
        // Live-apply the keys other services read once at construction.
        let retention = self.session.settings.data_retention();
        if let Some(engine) = self.dialogs.engine_mut() {
            engine.core_mut().set_retention(retention);
        }
        if key.starts_with("nav.") {
            let config = self.session.settings.pathfinding_config();
            self.session.rebuild_pathfinder(config);
        }
    }

    fn describe_state(&self, output: &mut Vec<String>) {
        output.push(format!(
            "screen: {}",
            self.current_screen().as_deref().unwrap_or("-")
        ));
        let stack = self
            .dialogs
            .engine()
            .map(|engine| {
                engine
                    .stack()
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        output.push(format!(
            "stack: {}",
            if stack.is_empty() {
                "-".to_string()
            } else {
                stack.join(" > ")
            }
        ));
        let session = &self.session;
        output.push(format!(
            "campaign: {} credits {} agents {} missions {} difficulty {}",
            if session.campaign_active() { "active" } else { "idle" },
            session.credits,
            session.roster.len(),
            session.missions_completed,
            session.difficulty().as_str()
        ));
        if let Some(rendered) = self.dialogs.engine().and_then(|engine| engine.current_render()) {
            describe_render(&rendered, output);
        }
    }

    /// Appends queued dialog events and setting notices to `output`.
    fn flush(&mut self, output: &mut Vec<String>) {
        self.session.drain_notices_into(output);
        let Some(engine) = self.dialogs.engine_mut() else {
            return;
        };
        engine.drain_events_into(&mut self.events);
        let mut screen_entered = false;
        for event in self.events.drain(..) {
            match event {
                DialogEvent::Opened(rendered) => {
                    output.push(format!("[open] {}", rendered.state));
                    describe_render(&rendered, output);
                }
                DialogEvent::Refreshed(rendered) => {
                    output.push(format!("[refresh] {}", rendered.state));
                    describe_render(&rendered, output);
                }
                DialogEvent::Closed(state) => output.push(format!("[close] {state}")),
                DialogEvent::ScreenRequested(screen) => {
                    output.push(format!("[screen] {screen}"));
                    screen_entered = true;
                }
            }
        }
        if screen_entered && !engine.is_open() {
            match engine.current_render() {
                Some(rendered) => describe_render(&rendered, output),
                None => warn!("screen_render_missing"),
            }
        }
    }
}

fn describe_render(rendered: &RenderedDialog, output: &mut Vec<String>) {
    if !rendered.title.is_empty() {
        output.push(format!("  == {} ==", rendered.title));
    }
    for line in rendered.body.lines() {
        output.push(format!("  {line}"));
    }
    for (index, button) in rendered.buttons.iter().enumerate() {
        let mut flags = Vec::new();
        if button.style.primary {
            flags.push("primary");
        }
        if button.style.danger {
            flags.push("danger");
        }
        if button.style.disabled {
            flags.push("disabled");
        }
        let suffix = if flags.is_empty() {
            String::new()
        } else {
            format!(" ({})", flags.join(", "))
        };
        output.push(format!("  [{index}] {}{suffix}", button.text));
    }
}
