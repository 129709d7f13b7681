use cyberops_engine::dialog::{data_i64, data_str, ContentError};
use cyberops_engine::{ActionContext, ActionError, ActionRegistry};
use serde_json::Value;

use super::mission::Difficulty;
use super::session::{GameSession, DIFFICULTY};

const HUB: &str = "hub";
const MAIN_MENU: &str = "main-menu";
const PAUSE_MENU: &str = "pause-menu";
const SETTINGS: &str = "settings";
const MAIN_SETTINGS: &str = "main-settings";
const RECRUIT: &str = "recruit";
const AGENT_OFFER: &str = "agent-offer";
const MISSION_REPORT: &str = "mission-report";

type Ctx<'a> = ActionContext<'a, GameSession>;
type Handler = fn(&mut Ctx<'_>, &[String]) -> Result<(), ActionError>;

pub(crate) fn build_actions() -> ActionRegistry<GameSession> {
    let mut actions = ActionRegistry::new();
    let builtins: [(&str, &str, Handler); 11] = [
        ("start-campaign", "Start a fresh campaign", start_campaign),
        ("abandon-campaign", "Drop the campaign and return to the menu", abandon_campaign),
        ("open-settings", "Open the settings panel for the current context", open_settings),
        ("set-difficulty", "Change difficulty: set-difficulty:<easy|normal|hard>", set_difficulty),
        ("save-game", "Save the campaign: save-game:<slot>", save_game),
        ("load-game", "Load a campaign: load-game:<slot>", load_game),
        ("open-recruit", "Show the roster", open_recruit),
        ("offer-agent", "Scout the next candidate", offer_agent),
        ("hire-agent", "Hire the candidate on offer", hire_agent),
        ("deploy-mission", "Run the next mission", deploy_mission),
        ("quit", "Quit the game", quit),
    ];
    for (name, help, handler) in builtins {
        actions
            .register(name, help, handler)
            .expect("built-in action registration should not fail");
    }
    actions
}

fn navigate(
    ctx: &mut Ctx<'_>,
    target: &str,
    data: Option<Value>,
    refresh: bool,
) -> Result<(), ActionError> {
    if ctx.navigate_to(target, data, refresh) {
        Ok(())
    } else {
        Err(ActionError::new(format!("navigation to '{target}' was refused")))
    }
}

fn content_err(error: ContentError) -> ActionError {
    ActionError::new(error.to_string())
}

fn slot_arg(args: &[String]) -> Result<u8, ActionError> {
    let raw = args
        .first()
        .ok_or_else(|| ActionError::new("missing save slot argument"))?;
    raw.parse::<u8>()
        .map_err(|_| ActionError::new(format!("invalid save slot '{raw}'")))
}

fn start_campaign(ctx: &mut Ctx<'_>, _args: &[String]) -> Result<(), ActionError> {
    ctx.host_mut().start_campaign();
    navigate(ctx, HUB, None, false)
}

fn abandon_campaign(ctx: &mut Ctx<'_>, _args: &[String]) -> Result<(), ActionError> {
    ctx.host_mut().end_campaign();
    navigate(ctx, MAIN_MENU, None, false)
}

fn open_settings(ctx: &mut Ctx<'_>, _args: &[String]) -> Result<(), ActionError> {
    let target = if ctx
        .current_state()
        .is_some_and(|state| state.as_str() == PAUSE_MENU)
    {
        SETTINGS
    } else {
        MAIN_SETTINGS
    };
    let summary = ctx.host().settings_summary();
    navigate(ctx, target, Some(summary), false)
}

fn set_difficulty(ctx: &mut Ctx<'_>, args: &[String]) -> Result<(), ActionError> {
    let raw = args.first().map(String::as_str).unwrap_or_default();
    let difficulty = Difficulty::parse(raw)
        .ok_or_else(|| ActionError::new(format!("unknown difficulty '{raw}'")))?;
    ctx.host_mut()
        .settings
        .set(DIFFICULTY, difficulty.as_str().to_string())
        .map_err(|error| ActionError::new(error.to_string()))?;

    let showing_settings = ctx
        .current_state()
        .is_some_and(|state| state.as_str() == SETTINGS || state.as_str() == MAIN_SETTINGS);
    if showing_settings {
        let current = ctx.current_state().map(ToString::to_string).unwrap_or_default();
        let summary = ctx.host().settings_summary();
        navigate(ctx, &current, Some(summary), true)?;
    }
    Ok(())
}

fn save_game(ctx: &mut Ctx<'_>, args: &[String]) -> Result<(), ActionError> {
    let slot = slot_arg(args)?;
    ctx.host().save_to_slot(slot).map_err(ActionError::new)?;
    ctx.host().notice(format!("saved campaign to slot {slot}"));
    ctx.close_all();
    Ok(())
}

fn load_game(ctx: &mut Ctx<'_>, args: &[String]) -> Result<(), ActionError> {
    let slot = slot_arg(args)?;
    let save = ctx
        .host()
        .load_and_validate_save(slot)
        .map_err(ActionError::new)?;
    ctx.host_mut().apply_save_game(save);
    ctx.host().notice(format!("loaded campaign from slot {slot}"));
    navigate(ctx, HUB, None, false)
}

fn open_recruit(ctx: &mut Ctx<'_>, _args: &[String]) -> Result<(), ActionError> {
    if !ctx.host().campaign_active() {
        return Err(ActionError::new("no campaign in progress"));
    }
    let summary = ctx.host().roster_summary();
    navigate(ctx, RECRUIT, Some(summary), false)
}

fn offer_agent(ctx: &mut Ctx<'_>, _args: &[String]) -> Result<(), ActionError> {
    let offer = ctx.host_mut().next_offer();
    navigate(ctx, AGENT_OFFER, Some(offer), false)
}

fn hire_agent(ctx: &mut Ctx<'_>, _args: &[String]) -> Result<(), ActionError> {
    let offer = ctx
        .current_state_data()
        .cloned()
        .ok_or_else(|| ActionError::new("no candidate on offer"))?;
    let name = data_str(Some(&offer), "name").map_err(content_err)?;
    let specialty = data_str(Some(&offer), "specialty").map_err(content_err)?;
    let cost = data_i64(Some(&offer), "cost").map_err(content_err)?;
    ctx.host_mut()
        .hire(name, specialty, cost)
        .map_err(ActionError::new)?;

    ctx.back();
    let summary = ctx.host().roster_summary();
    navigate(ctx, RECRUIT, Some(summary), true)
}

fn deploy_mission(ctx: &mut Ctx<'_>, _args: &[String]) -> Result<(), ActionError> {
    let report = ctx.host_mut().deploy_mission().map_err(ActionError::new)?;
    navigate(ctx, MISSION_REPORT, Some(report), false)
}

fn quit(ctx: &mut Ctx<'_>, _args: &[String]) -> Result<(), ActionError> {
    ctx.host_mut().request_quit();
    Ok(())
}
