use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use roxmltree::{Document, Node};
use tracing::{debug, info};

use crate::dialog::{
    ButtonDef, ButtonStyle, DialogAction, DialogConfig, StateContent, StateDefinition,
    StateEventDef, StateId, StateKind, TransitionSpec,
};
use crate::AppPaths;

use super::discovery::{collect_xml_files_sorted, discover_content_sources};
use super::types::{ContentRequest, DiscoveryError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentErrorCode {
    Discovery,
    ReadFile,
    XmlMalformed,
    InvalidRoot,
    UnknownElement,
    UnknownField,
    DuplicateField,
    MissingField,
    InvalidValue,
    DuplicateStateInMod,
    InvalidGraph,
}

#[derive(Debug, Clone)]
pub struct ContentLoadError {
    pub code: ContentErrorCode,
    pub message: String,
    pub mod_id: String,
    pub file_path: PathBuf,
    pub location: Option<SourceLocation>,
}

impl fmt::Display for ContentLoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location {
            Some(loc) => write!(
                f,
                "{:?}: {} (mod={}, file={}, line={}, column={})",
                self.code,
                self.message,
                self.mod_id,
                self.file_path.display(),
                loc.line,
                loc.column
            ),
            None => write!(
                f,
                "{:?}: {} (mod={}, file={})",
                self.code,
                self.message,
                self.mod_id,
                self.file_path.display()
            ),
        }
    }
}

impl std::error::Error for ContentLoadError {}

#[derive(Debug, Clone)]
struct StateOrigin {
    mod_id: String,
    file_path: PathBuf,
    location: SourceLocation,
}

/// Loads and validates the dialog graph from base content plus enabled mods.
///
/// A mod may declare each state id once; later mods replace earlier
/// declarations in place.
pub fn load_dialog_config(
    app_paths: &AppPaths,
    request: &ContentRequest,
) -> Result<DialogConfig, ContentLoadError> {
    let sources = discover_content_sources(app_paths, request)
        .map_err(|error| map_discovery_error(error, &app_paths.root))?;

    let mut merged = Vec::<StateDefinition>::new();
    let mut index_by_id = HashMap::<StateId, usize>::new();
    let mut origins = HashMap::<StateId, StateOrigin>::new();

    for source in sources {
        let xml_files = collect_xml_files_sorted(&source.source_dir).map_err(|error| {
            read_error(&source.mod_id, error.path, error.source)
        })?;
        let mut seen_in_mod = HashSet::<StateId>::new();

        for xml_file in xml_files {
            let raw = fs::read_to_string(&xml_file)
                .map_err(|source_err| read_error(&source.mod_id, xml_file.clone(), source_err))?;
            let parsed = parse_dialog_document(&source.mod_id, &xml_file, &raw)?;
            debug!(
                mod_id = %source.mod_id,
                file = %xml_file.display(),
                states = parsed.len(),
                "dialog_file_parsed"
            );
            for (state, location) in parsed {
                if !seen_in_mod.insert(state.id.clone()) {
                    return Err(ContentLoadError {
                        code: ContentErrorCode::DuplicateStateInMod,
                        message: format!(
                            "duplicate State '{}' in mod '{}'; each mod may declare a state id once",
                            state.id, source.mod_id
                        ),
                        mod_id: source.mod_id.clone(),
                        file_path: xml_file.clone(),
                        location: Some(location),
                    });
                }
                origins.insert(
                    state.id.clone(),
                    StateOrigin {
                        mod_id: source.mod_id.clone(),
                        file_path: xml_file.clone(),
                        location,
                    },
                );
                match index_by_id.get(&state.id) {
                    Some(index) => merged[*index] = state,
                    None => {
                        index_by_id.insert(state.id.clone(), merged.len());
                        merged.push(state);
                    }
                }
            }
        }
    }

    let config = DialogConfig::new(merged).map_err(|error| {
        let origin = error.state().and_then(|state| origins.get(state));
        ContentLoadError {
            code: ContentErrorCode::InvalidGraph,
            message: error.to_string(),
            mod_id: origin
                .map(|origin| origin.mod_id.clone())
                .unwrap_or_else(|| "<graph>".to_string()),
            file_path: origin
                .map(|origin| origin.file_path.clone())
                .unwrap_or_else(|| app_paths.base_content_dir.clone()),
            location: origin.map(|origin| origin.location),
        }
    })?;

    info!(
        states = config.len(),
        mods = request.enabled_mods.len(),
        fingerprint = %config.fingerprint(),
        "dialog_config_loaded"
    );
    Ok(config)
}

/// Parses one `<Dialogs>` document. Graph-level checks happen in [`DialogConfig::new`].
pub fn parse_dialog_document(
    mod_id: &str,
    file_path: &Path,
    raw: &str,
) -> Result<Vec<(StateDefinition, SourceLocation)>, ContentLoadError> {
    let doc = Document::parse(raw).map_err(|error| ContentLoadError {
        code: ContentErrorCode::XmlMalformed,
        message: format!("malformed XML: {error}"),
        mod_id: mod_id.to_string(),
        file_path: file_path.to_path_buf(),
        location: Some(SourceLocation {
            line: error.pos().row as usize,
            column: error.pos().col as usize,
        }),
    })?;

    let cx = ParseCx {
        mod_id,
        file_path,
        doc: &doc,
    };
    let root = doc.root_element();
    if root.tag_name().name() != "Dialogs" {
        return Err(cx.error_at(
            ContentErrorCode::InvalidRoot,
            "root element must be <Dialogs>".to_string(),
            root,
        ));
    }

    let mut states = Vec::new();
    for child in root.children().filter(|node| node.is_element()) {
        if child.tag_name().name() != "State" {
            return Err(cx.error_at(
                ContentErrorCode::UnknownElement,
                format!(
                    "unsupported element <{}>; <Dialogs> holds only <State>",
                    child.tag_name().name()
                ),
                child,
            ));
        }
        states.push((parse_state(&cx, child)?, cx.location_of(child)));
    }
    Ok(states)
}

struct ParseCx<'a, 'input> {
    mod_id: &'a str,
    file_path: &'a Path,
    doc: &'a Document<'input>,
}

impl ParseCx<'_, '_> {
    fn location_of(&self, node: Node<'_, '_>) -> SourceLocation {
        let pos = self.doc.text_pos_at(node.range().start);
        SourceLocation {
            line: pos.row as usize,
            column: pos.col as usize,
        }
    }

    fn error_at(
        &self,
        code: ContentErrorCode,
        message: String,
        node: Node<'_, '_>,
    ) -> ContentLoadError {
        ContentLoadError {
            code,
            message,
            mod_id: self.mod_id.to_string(),
            file_path: self.file_path.to_path_buf(),
            location: Some(self.location_of(node)),
        }
    }

    fn check_attributes(&self, node: Node<'_, '_>, allowed: &[&str]) -> Result<(), ContentLoadError> {
        for attribute in node.attributes() {
            if !allowed.contains(&attribute.name()) {
                return Err(self.error_at(
                    ContentErrorCode::UnknownField,
                    format!(
                        "unknown attribute '{}' on <{}>",
                        attribute.name(),
                        node.tag_name().name()
                    ),
                    node,
                ));
            }
        }
        Ok(())
    }

    fn required_attribute(&self, node: Node<'_, '_>, name: &str) -> Result<String, ContentLoadError> {
        let value = node.attribute(name).map(str::trim).unwrap_or_default();
        if value.is_empty() {
            return Err(self.error_at(
                ContentErrorCode::MissingField,
                format!(
                    "missing required attribute '{}' on <{}>",
                    name,
                    node.tag_name().name()
                ),
                node,
            ));
        }
        Ok(value.to_string())
    }

    fn number_attribute<T: std::str::FromStr>(
        &self,
        node: Node<'_, '_>,
        name: &str,
    ) -> Result<T, ContentLoadError> {
        let raw = self.required_attribute(node, name)?;
        raw.parse::<T>().map_err(|_| {
            self.error_at(
                ContentErrorCode::InvalidValue,
                format!("{} '{}' is not a valid non-negative integer", name, raw),
                node,
            )
        })
    }
}

fn parse_state(cx: &ParseCx<'_, '_>, node: Node<'_, '_>) -> Result<StateDefinition, ContentLoadError> {
    cx.check_attributes(node, &["id", "kind", "level", "parent"])?;
    let id = cx.required_attribute(node, "id")?;
    let kind = match cx.required_attribute(node, "kind")?.as_str() {
        "screen" => StateKind::Screen,
        "dialog" => StateKind::Dialog,
        other => {
            return Err(cx.error_at(
                ContentErrorCode::InvalidValue,
                format!("invalid kind '{}'; allowed values: screen, dialog", other),
                node,
            ))
        }
    };
    let level = cx.number_attribute::<u32>(node, "level")?;

    let mut state = StateDefinition::new(id, kind, level);
    if let Some(parent) = node.attribute("parent").map(str::trim) {
        if parent.is_empty() {
            return Err(cx.error_at(
                ContentErrorCode::InvalidValue,
                "parent must not be empty when present".to_string(),
                node,
            ));
        }
        state.parent = Some(StateId::from(parent));
    }

    let mut seen_fields = HashSet::<String>::new();
    for field in node.children().filter(|child| child.is_element()) {
        let field_name = field.tag_name().name().to_string();
        if !seen_fields.insert(field_name.clone()) {
            return Err(cx.error_at(
                ContentErrorCode::DuplicateField,
                format!("duplicate field <{}> in <State>", field_name),
                field,
            ));
        }

        match field_name.as_str() {
            "title" => {
                cx.check_attributes(field, &[])?;
                state.title = field.text().map(str::trim).unwrap_or_default().to_string();
            }
            "content" => state.content = parse_content(cx, field)?,
            "buttons" => state.buttons = parse_buttons(cx, field)?,
            "transition" => state.transition = Some(parse_transition(cx, field)?),
            "events" => state.events = parse_events(cx, field)?,
            _ => {
                return Err(cx.error_at(
                    ContentErrorCode::UnknownField,
                    format!("unknown field <{}> in <State>", field_name),
                    field,
                ))
            }
        }
    }

    Ok(state)
}

fn parse_content(cx: &ParseCx<'_, '_>, node: Node<'_, '_>) -> Result<StateContent, ContentLoadError> {
    cx.check_attributes(node, &["template"])?;
    let text = node.text().map(str::trim).unwrap_or_default();
    match node.attribute("template").map(str::trim) {
        Some("") => Err(cx.error_at(
            ContentErrorCode::InvalidValue,
            "template name must not be empty".to_string(),
            node,
        )),
        Some(_) if !text.is_empty() => Err(cx.error_at(
            ContentErrorCode::InvalidValue,
            "<content> takes either a template attribute or text, not both".to_string(),
            node,
        )),
        Some(template) => Ok(StateContent::Template(template.to_string())),
        None => Ok(StateContent::Static(text.to_string())),
    }
}

fn parse_buttons(cx: &ParseCx<'_, '_>, node: Node<'_, '_>) -> Result<Vec<ButtonDef>, ContentLoadError> {
    cx.check_attributes(node, &[])?;
    let mut buttons = Vec::new();
    for child in node.children().filter(|child| child.is_element()) {
        if child.tag_name().name() != "button" {
            return Err(cx.error_at(
                ContentErrorCode::UnknownElement,
                format!(
                    "unsupported element <{}>; <buttons> holds only <button>",
                    child.tag_name().name()
                ),
                child,
            ));
        }
        cx.check_attributes(child, &["action", "style"])?;
        let raw_action = cx.required_attribute(child, "action")?;
        let action = raw_action.parse::<DialogAction>().map_err(|error| {
            cx.error_at(
                ContentErrorCode::InvalidValue,
                format!("invalid action: {error}"),
                child,
            )
        })?;
        let text = child.text().map(str::trim).unwrap_or_default();
        if text.is_empty() {
            return Err(cx.error_at(
                ContentErrorCode::MissingField,
                "button text must not be empty".to_string(),
                child,
            ));
        }
        let mut style = ButtonStyle::default();
        for flag in child.attribute("style").unwrap_or_default().split_whitespace() {
            match flag {
                "primary" => style.primary = true,
                "danger" => style.danger = true,
                "disabled" => style.disabled = true,
                other => {
                    return Err(cx.error_at(
                        ContentErrorCode::InvalidValue,
                        format!(
                            "invalid button style '{}'; allowed values: primary, danger, disabled",
                            other
                        ),
                        child,
                    ))
                }
            }
        }
        buttons.push(ButtonDef {
            text: text.to_string(),
            action,
            style,
        });
    }
    Ok(buttons)
}

fn parse_transition(
    cx: &ParseCx<'_, '_>,
    node: Node<'_, '_>,
) -> Result<TransitionSpec, ContentLoadError> {
    cx.check_attributes(node, &["enter", "exit", "durationMs"])?;
    let name = |attribute: &str| {
        node.attribute(attribute)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(ToString::to_string)
    };
    Ok(TransitionSpec {
        enter: name("enter"),
        exit: name("exit"),
        duration_ms: cx.number_attribute::<u32>(node, "durationMs")?,
    })
}

fn parse_events(
    cx: &ParseCx<'_, '_>,
    node: Node<'_, '_>,
) -> Result<Vec<StateEventDef>, ContentLoadError> {
    cx.check_attributes(node, &[])?;
    let mut events = Vec::new();
    for child in node.children().filter(|child| child.is_element()) {
        if child.tag_name().name() != "timer" {
            return Err(cx.error_at(
                ContentErrorCode::UnknownElement,
                format!(
                    "unsupported event <{}>; <events> holds only <timer>",
                    child.tag_name().name()
                ),
                child,
            ));
        }
        cx.check_attributes(child, &["delayMs", "target"])?;
        events.push(StateEventDef::Timer {
            delay_ms: cx.number_attribute::<u64>(child, "delayMs")?,
            target: StateId::new(cx.required_attribute(child, "target")?),
        });
    }
    Ok(events)
}

fn read_error(mod_id: &str, path: PathBuf, source: std::io::Error) -> ContentLoadError {
    ContentLoadError {
        code: ContentErrorCode::ReadFile,
        message: format!("failed to read dialog content: {source}"),
        mod_id: mod_id.to_string(),
        file_path: path,
        location: None,
    }
}

fn map_discovery_error(error: DiscoveryError, root: &Path) -> ContentLoadError {
    match error {
        DiscoveryError::EnabledModMissing {
            mod_id,
            expected_dir,
        } => ContentLoadError {
            code: ContentErrorCode::Discovery,
            message: format!(
                "enabled mod '{}' not found at {}; check CYBEROPS_ENABLED_MODS",
                mod_id,
                expected_dir.display()
            ),
            mod_id,
            file_path: expected_dir,
            location: None,
        },
        other => ContentLoadError {
            code: ContentErrorCode::Discovery,
            message: other.to_string(),
            mod_id: "<discovery>".to_string(),
            file_path: root.to_path_buf(),
            location: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    fn setup_app_paths(root: &Path) -> AppPaths {
        let app = AppPaths::from_root(root.to_path_buf());
        fs::create_dir_all(&app.base_content_dir).expect("base");
        fs::create_dir_all(&app.mods_dir).expect("mods");
        app
    }

    fn write_file(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("mkdir");
        }
        fs::write(path, content).expect("write");
    }

    fn parse(raw: &str) -> Result<Vec<(StateDefinition, SourceLocation)>, ContentLoadError> {
        parse_dialog_document("base", Path::new("dialogs.xml"), raw)
    }

    const PAUSE_FLOW: &str = r#"<Dialogs>
        <State id="game" kind="screen" level="0"/>
        <State id="pause-menu" kind="dialog" level="1" parent="game">
            <title>Paused</title>
            <content>Operation on hold.</content>
            <buttons>
                <button action="navigate:settings" style="primary">Settings</button>
                <button action="execute:save-game:1">Save</button>
                <button action="close-all" style="danger disabled">Abort</button>
            </buttons>
            <transition enter="fade-in" durationMs="150"/>
        </State>
        <State id="settings" kind="dialog" level="2" parent="pause-menu">
            <content template="settings-summary"/>
            <events><timer delayMs="500" target="pause-menu"/></events>
        </State>
    </Dialogs>"#;

    #[test]
    fn parses_full_state_definitions() {
        let states = parse(PAUSE_FLOW).expect("parse");
        assert_eq!(states.len(), 3);

        let (pause, location) = &states[1];
        assert_eq!(location.line, 3);
        assert_eq!(pause.parent, Some(StateId::from("game")));
        assert_eq!(pause.title, "Paused");
        assert_eq!(
            pause.content,
            StateContent::Static("Operation on hold.".to_string())
        );
        assert_eq!(pause.buttons.len(), 3);
        assert!(pause.buttons[0].style.primary);
        assert_eq!(
            pause.buttons[1].action,
            DialogAction::Execute {
                name: "save-game".to_string(),
                args: vec!["1".to_string()],
            }
        );
        assert!(pause.buttons[2].style.danger && pause.buttons[2].style.disabled);
        assert_eq!(
            pause.transition,
            Some(TransitionSpec {
                enter: Some("fade-in".to_string()),
                exit: None,
                duration_ms: 150,
            })
        );

        let (settings, _) = &states[2];
        assert_eq!(
            settings.content,
            StateContent::Template("settings-summary".to_string())
        );
        assert_eq!(
            settings.events,
            vec![StateEventDef::Timer {
                delay_ms: 500,
                target: StateId::from("pause-menu"),
            }]
        );
    }

    #[test]
    fn structural_errors_carry_codes_and_locations() {
        let cases = [
            (r#"<Defs/>"#, ContentErrorCode::InvalidRoot),
            (r#"<Dialogs><Panel/></Dialogs>"#, ContentErrorCode::UnknownElement),
            (
                r#"<Dialogs><State id="a" kind="screen" level="0" mood="x"/></Dialogs>"#,
                ContentErrorCode::UnknownField,
            ),
            (
                r#"<Dialogs><State id="a" kind="screen" level="0"><title/><title/></State></Dialogs>"#,
                ContentErrorCode::DuplicateField,
            ),
            (
                r#"<Dialogs><State kind="screen" level="0"/></Dialogs>"#,
                ContentErrorCode::MissingField,
            ),
            (
                r#"<Dialogs><State id="a" kind="popup" level="0"/></Dialogs>"#,
                ContentErrorCode::InvalidValue,
            ),
            (
                r#"<Dialogs><State id="a" kind="dialog" level="-1"/></Dialogs>"#,
                ContentErrorCode::InvalidValue,
            ),
            (
                r#"<Dialogs><State id="a" kind="dialog" level="1"><buttons><button action="navigate:">Go</button></buttons></State></Dialogs>"#,
                ContentErrorCode::InvalidValue,
            ),
            (
                r#"<Dialogs><State id="a" kind="dialog" level="1"><buttons><button action="close" style="shiny">Go</button></buttons></State></Dialogs>"#,
                ContentErrorCode::InvalidValue,
            ),
            (
                r#"<Dialogs><State id="a" kind="dialog" level="1"><content template="t">text</content></State></Dialogs>"#,
                ContentErrorCode::InvalidValue,
            ),
            (
                r#"<Dialogs><State id="a" kind="dialog" level="1"><events><sound/></events></State></Dialogs>"#,
                ContentErrorCode::UnknownElement,
            ),
            (r#"<Dialogs><State id="a""#, ContentErrorCode::XmlMalformed),
        ];
        for (raw, expected) in cases {
            let err = parse(raw).expect_err(raw);
            assert_eq!(err.code, expected, "{raw}");
            assert!(err.location.is_some(), "{raw}");
            assert_eq!(err.mod_id, "base");
        }
    }

    #[test]
    fn loads_graph_from_base_content() {
        let temp = TempDir::new().expect("temp");
        let app = setup_app_paths(temp.path());
        write_file(&app.base_content_dir.join("dialogs.xml"), PAUSE_FLOW);

        let config = load_dialog_config(&app, &ContentRequest::default()).expect("load");
        assert_eq!(config.len(), 3);
        assert_eq!(config.get("settings").map(|state| state.level), Some(2));
    }

    #[test]
    fn same_mod_duplicate_state_errors() {
        let temp = TempDir::new().expect("temp");
        let app = setup_app_paths(temp.path());
        write_file(
            &app.base_content_dir.join("a.xml"),
            r#"<Dialogs><State id="game" kind="screen" level="0"/></Dialogs>"#,
        );
        write_file(
            &app.base_content_dir.join("b.xml"),
            r#"<Dialogs><State id="game" kind="screen" level="0"/></Dialogs>"#,
        );
        let err = load_dialog_config(&app, &ContentRequest::default()).expect_err("err");
        assert_eq!(err.code, ContentErrorCode::DuplicateStateInMod);
        assert!(err.file_path.ends_with("b.xml"));
    }

    #[test]
    fn cross_mod_duplicate_is_last_mod_wins() {
        let temp = TempDir::new().expect("temp");
        let app = setup_app_paths(temp.path());
        write_file(&app.base_content_dir.join("dialogs.xml"), PAUSE_FLOW);
        write_file(
            &app.mods_dir.join("noir").join("dialogs.xml"),
            r#"<Dialogs>
                <State id="pause-menu" kind="dialog" level="1" parent="game">
                    <title>Standby</title>
                </State>
            </Dialogs>"#,
        );

        let config =
            load_dialog_config(&app, &ContentRequest::with_mods(["noir"])).expect("load");
        assert_eq!(config.len(), 3);
        assert_eq!(config.states()[1].title, "Standby");
        assert!(config.states()[1].buttons.is_empty());
    }

    #[test]
    fn graph_errors_point_at_the_offending_state() {
        let temp = TempDir::new().expect("temp");
        let app = setup_app_paths(temp.path());
        write_file(
            &app.mods_dir.join("broken").join("dialogs.xml"),
            r#"<Dialogs>
                <State id="orphan" kind="dialog" level="2" parent="nowhere"/>
            </Dialogs>"#,
        );
        let err =
            load_dialog_config(&app, &ContentRequest::with_mods(["broken"])).expect_err("err");
        assert_eq!(err.code, ContentErrorCode::InvalidGraph);
        assert_eq!(err.mod_id, "broken");
        assert_eq!(err.location.map(|loc| loc.line), Some(2));
    }

    #[test]
    fn missing_mod_is_a_discovery_error() {
        let temp = TempDir::new().expect("temp");
        let app = setup_app_paths(temp.path());
        let err =
            load_dialog_config(&app, &ContentRequest::with_mods(["ghost"])).expect_err("err");
        assert_eq!(err.code, ContentErrorCode::Discovery);
        assert_eq!(err.mod_id, "ghost");
    }
}
