use std::cell::RefCell;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use cyberops_engine::persist::{parse_json, write_json_atomic};
use cyberops_engine::{
    AppPaths, PathfindingConfig, PathfindingService, PersistError, SettingsService,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use super::enemies::EnemyService;
use super::mission::{mission_map, run_mission, Difficulty};

pub(crate) const MASTER_VOLUME: &str = "audio.master_volume";
pub(crate) const DIFFICULTY: &str = "gameplay.difficulty";
const SAVE_VERSION: u32 = 1;
pub(crate) const SAVE_SLOT_COUNT: u8 = 3;
const STARTING_CREDITS: i64 = 1000;
const STARTER_AGENTS: [(&str, &str); 2] = [("Vex", "hacker"), ("Rook", "heavy")];
const CANDIDATES: [(&str, &str, i64); 5] = [
    ("Kestrel", "infiltrator", 400),
    ("Mako", "medic", 350),
    ("Juno", "sniper", 500),
    ("Tallis", "engineer", 300),
    ("Orrin", "heavy", 450),
];

pub(crate) type SaveLoadResult<T> = Result<T, String>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Agent {
    pub(crate) name: String,
    pub(crate) specialty: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct SaveGame {
    pub(crate) save_version: u32,
    pub(crate) credits: i64,
    pub(crate) missions_completed: u32,
    pub(crate) offers_made: u32,
    pub(crate) roster: Vec<Agent>,
}

/// Host game state handed to dialog action handlers.
pub(crate) struct GameSession {
    pub(crate) app_paths: AppPaths,
    pub(crate) settings: SettingsService,
    pub(crate) pathfinder: PathfindingService,
    pub(crate) enemies: EnemyService,
    pub(crate) credits: i64,
    pub(crate) missions_completed: u32,
    pub(crate) roster: Vec<Agent>,
    offers_made: u32,
    campaign_active: bool,
    quit_requested: bool,
    notices: Rc<RefCell<Vec<String>>>,
}

impl GameSession {
    pub(crate) fn new(app_paths: AppPaths, mut settings: SettingsService) -> Self {
        let notices = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&notices);
        settings.subscribe(None, move |key, value| {
            sink.borrow_mut().push(format!("setting {key} = {value}"));
        });
        let pathfinder = PathfindingService::new(settings.pathfinding_config());
        Self {
            app_paths,
            settings,
            pathfinder,
            enemies: EnemyService::default(),
            credits: 0,
            missions_completed: 0,
            roster: Vec::new(),
            offers_made: 0,
            campaign_active: false,
            quit_requested: false,
            notices,
        }
    }

    pub(crate) fn campaign_active(&self) -> bool {
        self.campaign_active
    }

    pub(crate) fn quit_requested(&self) -> bool {
        self.quit_requested
    }

    pub(crate) fn request_quit(&mut self) {
        self.quit_requested = true;
    }

    pub(crate) fn notice(&self, text: impl Into<String>) {
        self.notices.borrow_mut().push(text.into());
    }

    pub(crate) fn drain_notices_into(&self, out: &mut Vec<String>) {
        out.append(&mut self.notices.borrow_mut());
    }

    pub(crate) fn start_campaign(&mut self) {
        self.credits = STARTING_CREDITS;
        self.missions_completed = 0;
        self.offers_made = 0;
        self.roster = STARTER_AGENTS
            .iter()
            .map(|(name, specialty)| Agent {
                name: (*name).to_string(),
                specialty: (*specialty).to_string(),
            })
            .collect();
        self.enemies.clear();
        self.campaign_active = true;
        info!(credits = self.credits, agents = self.roster.len(), "campaign_started");
    }

    pub(crate) fn end_campaign(&mut self) {
        self.campaign_active = false;
        self.roster.clear();
        self.enemies.clear();
        self.credits = 0;
        info!("campaign_abandoned");
    }

    pub(crate) fn difficulty(&self) -> Difficulty {
        self.settings
            .get::<String>(DIFFICULTY)
            .ok()
            .and_then(|raw| Difficulty::parse(&raw))
            .unwrap_or(Difficulty::Normal)
    }

    pub(crate) fn settings_summary(&self) -> Value {
        json!({
            "difficulty": self.difficulty().as_str(),
            "master_volume": self.settings.get::<f64>(MASTER_VOLUME).unwrap_or(1.0),
        })
    }

    pub(crate) fn roster_summary(&self) -> Value {
        json!({
            "credits": self.credits,
            "agents": self.roster,
        })
    }

    /// Next candidate in rotation, priced for the current difficulty.
    pub(crate) fn next_offer(&mut self) -> Value {
        let (name, specialty, base_cost) = CANDIDATES[self.offers_made as usize % CANDIDATES.len()];
        self.offers_made += 1;
        let cost = match self.difficulty() {
            Difficulty::Easy => base_cost * 3 / 4,
            Difficulty::Normal => base_cost,
            Difficulty::Hard => base_cost * 5 / 4,
        };
        json!({
            "name": name,
            "specialty": specialty,
            "cost": cost,
            "credits": self.credits,
        })
    }

    pub(crate) fn hire(&mut self, name: &str, specialty: &str, cost: i64) -> Result<(), String> {
        if self.roster.iter().any(|agent| agent.name == name) {
            return Err(format!("{name} is already on the roster"));
        }
        if self.credits < cost {
            return Err(format!("hiring {name} costs {cost} credits, only {} available", self.credits));
        }
        self.credits -= cost;
        self.roster.push(Agent {
            name: name.to_string(),
            specialty: specialty.to_string(),
        });
        info!(agent = name, cost, credits = self.credits, "agent_hired");
        Ok(())
    }

    /// Swaps in a pathfinder built from `config`, keeping the mission map when one was set.
    pub(crate) fn rebuild_pathfinder(&mut self, config: PathfindingConfig) {
        let had_map = self.pathfinder.has_map_provider();
        self.pathfinder = PathfindingService::new(config);
        if had_map {
            match mission_map() {
                Ok(map) => self.pathfinder.set_map_provider(map),
                Err(error) => warn!(error = %error, "mission_map_invalid"),
            }
        }
    }

    /// Runs a mission with the current roster and books the payout.
    pub(crate) fn deploy_mission(&mut self) -> Result<Value, String> {
        if !self.campaign_active {
            return Err("no campaign in progress".to_string());
        }
        if self.roster.is_empty() {
            return Err("roster is empty; recruit an agent first".to_string());
        }
        let outcome = run_mission(
            self.roster.len(),
            self.difficulty(),
            &mut self.pathfinder,
            &mut self.enemies,
        )?;
        self.missions_completed += 1;
        self.credits += outcome.reward;
        Ok(json!({
            "mission": self.missions_completed,
            "reward": outcome.reward,
            "intercepts": outcome.intercepts,
            "neutralized": outcome.neutralized,
            "extracted": outcome.extracted,
            "enemies": outcome.enemies,
            "routed": outcome.routed,
            "squad_waypoints": outcome.squad_waypoints,
            "credits": self.credits,
        }))
    }

    pub(crate) fn save_slot_path(&self, slot: u8) -> SaveLoadResult<PathBuf> {
        if slot == 0 || slot > SAVE_SLOT_COUNT {
            return Err(format!("save slot must be 1..={SAVE_SLOT_COUNT}, got {slot}"));
        }
        Ok(self.app_paths.saves_dir().join(format!("slot-{slot}.json")))
    }

    pub(crate) fn build_save_game(&self) -> SaveLoadResult<SaveGame> {
        if !self.campaign_active {
            return Err("no campaign in progress".to_string());
        }
        Ok(SaveGame {
            save_version: SAVE_VERSION,
            credits: self.credits,
            missions_completed: self.missions_completed,
            offers_made: self.offers_made,
            roster: self.roster.clone(),
        })
    }

    pub(crate) fn save_to_slot(&self, slot: u8) -> SaveLoadResult<PathBuf> {
        let save = self.build_save_game()?;
        let path = self.save_slot_path(slot)?;
        write_json_atomic(&path, &save).map_err(|error| error.to_string())?;
        info!(slot, path = %path.display(), "game_saved");
        Ok(path)
    }

    pub(crate) fn load_and_validate_save(&self, slot: u8) -> SaveLoadResult<SaveGame> {
        let path = self.save_slot_path(slot)?;
        let raw = std::fs::read_to_string(&path)
            .map_err(|error| format!("read save '{}': {error}", path.display()))?;
        let save = parse_save_game_json(&raw)?;
        validate_save_game(&save)?;
        Ok(save)
    }

    pub(crate) fn apply_save_game(&mut self, save: SaveGame) {
        self.credits = save.credits;
        self.missions_completed = save.missions_completed;
        self.offers_made = save.offers_made;
        self.roster = save.roster;
        self.enemies.clear();
        self.campaign_active = true;
        info!(credits = self.credits, agents = self.roster.len(), "game_loaded");
    }
}

pub(crate) fn parse_save_game_json(raw: &str) -> SaveLoadResult<SaveGame> {
    parse_json(Path::new("save.json"), raw).map_err(|error| match error {
        PersistError::Decode {
            json_path, source, ..
        } => {
            if json_path.is_empty() || json_path == "." {
                format!("parse save json: {source}")
            } else {
                format!("parse save json at {json_path}: {source}")
            }
        }
        other => format!("parse save json: {other}"),
    })
}

fn validation_err(path: &str, message: impl Into<String>) -> String {
    format!("validation failed at {path}: {}", message.into())
}

fn expected_actual(path: &str, expected: impl Display, actual: impl Display) -> String {
    validation_err(path, format!("expected {expected}, got {actual}"))
}

pub(crate) fn validate_save_game(save: &SaveGame) -> SaveLoadResult<()> {
    if save.save_version != SAVE_VERSION {
        return Err(expected_actual(
            "save_version",
            SAVE_VERSION,
            save.save_version,
        ));
    }
    if save.credits < 0 {
        return Err(expected_actual(
            "credits",
            "non-negative amount",
            save.credits,
        ));
    }
    for (index, agent) in save.roster.iter().enumerate() {
        if agent.name.trim().is_empty() {
            return Err(validation_err(
                &format!("roster[{index}].name"),
                "agent name cannot be empty",
            ));
        }
        if save.roster[..index].iter().any(|other| other.name == agent.name) {
            return Err(validation_err(
                &format!("roster[{index}].name"),
                format!("duplicate agent '{}'", agent.name),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use cyberops_engine::SettingValue;
    use tempfile::TempDir;

    use super::*;

    fn session(temp: &TempDir) -> GameSession {
        let mut settings = SettingsService::with_engine_defaults();
        settings
            .register_default(MASTER_VOLUME, 0.8_f64)
            .expect("volume");
        settings
            .register_default(DIFFICULTY, "normal".to_string())
            .expect("difficulty");
        GameSession::new(AppPaths::from_root(temp.path().to_path_buf()), settings)
    }

    #[test]
    fn settings_changes_become_notices() {
        let temp = TempDir::new().expect("temp");
        let mut session = session(&temp);
        session
            .settings
            .set_value(DIFFICULTY, SettingValue::Text("hard".to_string()))
            .expect("set");
        let mut notices = Vec::new();
        session.drain_notices_into(&mut notices);
        assert_eq!(notices, vec!["setting gameplay.difficulty = hard".to_string()]);
        assert_eq!(session.difficulty(), Difficulty::Hard);
    }

    #[test]
    fn hiring_spends_credits_and_rejects_duplicates() {
        let temp = TempDir::new().expect("temp");
        let mut session = session(&temp);
        session.start_campaign();
        session.hire("Kestrel", "infiltrator", 400).expect("hire");
        assert_eq!(session.credits, 600);
        assert!(session.hire("Kestrel", "infiltrator", 400).is_err());
        assert!(session.hire("Juno", "sniper", 700).is_err());
        assert_eq!(session.roster.len(), 3);
    }

    #[test]
    fn offers_rotate_and_scale_with_difficulty() {
        let temp = TempDir::new().expect("temp");
        let mut session = session(&temp);
        let first = session.next_offer();
        assert_eq!(first["name"], "Kestrel");
        assert_eq!(first["cost"], 400);
        session
            .settings
            .set(DIFFICULTY, "easy".to_string())
            .expect("set");
        let second = session.next_offer();
        assert_eq!(second["name"], "Mako");
        assert_eq!(second["cost"], 262);
    }

    #[test]
    fn deploying_pays_out_and_counts_missions() {
        let temp = TempDir::new().expect("temp");
        let mut session = session(&temp);
        assert!(session.deploy_mission().is_err());

        session.start_campaign();
        let report = session.deploy_mission().expect("deploy");
        assert_eq!(report["mission"], 1);
        assert_eq!(report["enemies"], 3);
        assert_eq!(session.missions_completed, 1);
        assert!(session.credits > STARTING_CREDITS);
        assert!(session.pathfinder.has_map_provider());
    }

    #[test]
    fn save_then_load_restores_campaign() {
        let temp = TempDir::new().expect("temp");
        let mut session = session(&temp);
        assert!(session.save_to_slot(1).is_err());

        session.start_campaign();
        session.hire("Mako", "medic", 350).expect("hire");
        let path = session.save_to_slot(2).expect("save");
        assert!(path.ends_with("saves/slot-2.json"));

        session.end_campaign();
        let save = session.load_and_validate_save(2).expect("load");
        session.apply_save_game(save);
        assert!(session.campaign_active());
        assert_eq!(session.credits, 650);
        assert_eq!(session.roster.len(), 3);
    }

    #[test]
    fn invalid_slots_and_saves_are_rejected() {
        let temp = TempDir::new().expect("temp");
        let session = session(&temp);
        assert!(session.save_slot_path(0).is_err());
        assert!(session.save_slot_path(SAVE_SLOT_COUNT + 1).is_err());
        assert!(session
            .load_and_validate_save(1)
            .expect_err("missing")
            .starts_with("read save"));

        let error = parse_save_game_json(
            r#"{"save_version":1,"credits":"many","missions_completed":0,"offers_made":0,"roster":[]}"#,
        )
        .expect_err("mistyped");
        assert!(error.contains("at credits"), "{error}");

        let mut save = SaveGame {
            save_version: SAVE_VERSION + 1,
            credits: 10,
            missions_completed: 0,
            offers_made: 0,
            roster: Vec::new(),
        };
        assert!(validate_save_game(&save)
            .expect_err("version")
            .contains("save_version"));
        save.save_version = SAVE_VERSION;
        save.roster = vec![
            Agent {
                name: "Vex".to_string(),
                specialty: "hacker".to_string(),
            },
            Agent {
                name: "Vex".to_string(),
                specialty: "heavy".to_string(),
            },
        ];
        assert!(validate_save_game(&save)
            .expect_err("duplicate")
            .contains("roster[1].name"));
    }
}
