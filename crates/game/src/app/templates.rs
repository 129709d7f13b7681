use cyberops_engine::dialog::{data_i64, data_str, ContentError};
use cyberops_engine::{ContentTemplates, StateDefinition};
use serde_json::Value;

pub(crate) const AGENT_OFFER: &str = "agent-offer";
pub(crate) const SETTINGS_SUMMARY: &str = "settings-summary";
pub(crate) const ROSTER_SUMMARY: &str = "roster-summary";
pub(crate) const MISSION_REPORT: &str = "mission-report";

pub(crate) fn build_templates() -> ContentTemplates {
    let mut templates = ContentTemplates::new();
    templates.register(AGENT_OFFER, render_agent_offer);
    templates.register(SETTINGS_SUMMARY, render_settings_summary);
    templates.register(ROSTER_SUMMARY, render_roster_summary);
    templates.register(MISSION_REPORT, render_mission_report);
    templates
}

fn require_data<'a>(
    definition: &StateDefinition,
    data: Option<&'a Value>,
) -> Result<&'a Value, ContentError> {
    data.ok_or_else(|| ContentError::MissingData {
        state: definition.id.clone(),
    })
}

fn render_agent_offer(
    definition: &StateDefinition,
    data: Option<&Value>,
) -> Result<String, ContentError> {
    let data = Some(require_data(definition, data)?);
    let name = data_str(data, "name")?;
    let specialty = data_str(data, "specialty")?;
    let cost = data_i64(data, "cost")?;
    let credits = data_i64(data, "credits")?;
    let mut body = format!("{name} ({specialty}) will sign on for {cost} credits.");
    if credits < cost {
        body.push_str(&format!(" You have {credits} credits; the syndicate cannot afford them."));
    }
    Ok(body)
}

fn render_settings_summary(
    definition: &StateDefinition,
    data: Option<&Value>,
) -> Result<String, ContentError> {
    let data = Some(require_data(definition, data)?);
    let difficulty = data_str(data, "difficulty")?;
    let volume = data
        .and_then(|value| value.get("master_volume"))
        .and_then(Value::as_f64)
        .ok_or_else(|| ContentError::InvalidField {
            field: "master_volume".to_string(),
        })?;
    Ok(format!(
        "Difficulty: {difficulty}\nMaster volume: {:.0}%",
        volume * 100.0
    ))
}

fn render_roster_summary(
    definition: &StateDefinition,
    data: Option<&Value>,
) -> Result<String, ContentError> {
    let data = require_data(definition, data)?;
    let credits = data_i64(Some(data), "credits")?;
    let agents = data
        .get("agents")
        .and_then(Value::as_array)
        .ok_or_else(|| ContentError::InvalidField {
            field: "agents".to_string(),
        })?;

    let mut lines = vec![format!("Credits: {credits}")];
    if agents.is_empty() {
        lines.push("No agents on the roster.".to_string());
    }
    for agent in agents {
        let name = data_str(Some(agent), "name")?;
        let specialty = data_str(Some(agent), "specialty")?;
        lines.push(format!("- {name} ({specialty})"));
    }
    Ok(lines.join("\n"))
}

fn render_mission_report(
    definition: &StateDefinition,
    data: Option<&Value>,
) -> Result<String, ContentError> {
    let data = Some(require_data(definition, data)?);
    let mission = data_i64(data, "mission")?;
    let reward = data_i64(data, "reward")?;
    let intercepts = data_i64(data, "intercepts")?;
    let extracted = data
        .and_then(|value| value.get("extracted"))
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if !extracted {
        return Ok(format!("Mission {mission} failed: the squad never reached extraction."));
    }
    Ok(format!(
        "Mission {mission} complete. Contacts: {intercepts}. Payout: {reward} credits."
    ))
}
