use std::collections::HashMap;

use cyberops_engine::SettingValue;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ConsoleCommand {
    Help,
    Navigate {
        state: String,
        data: Option<Value>,
        refresh: bool,
    },
    Back,
    Close,
    CloseAll,
    Action {
        raw: String,
    },
    Press {
        index: usize,
    },
    Tick {
        millis: u64,
    },
    Path {
        start: (f32, f32),
        end: (f32, f32),
        smooth: bool,
    },
    State,
    Enemies,
    Set {
        key: String,
        value: SettingValue,
    },
    Persist,
    Resume,
    Quit,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CommandParseError {
    reason: String,
    usage: String,
}

impl CommandParseError {
    fn new(reason: impl Into<String>, usage: &str) -> Self {
        Self {
            reason: reason.into(),
            usage: usage.to_string(),
        }
    }
}

type ParseFn = dyn Fn(&[String]) -> Result<ConsoleCommand, CommandParseError>;
type BuiltinParse = fn(&[String]) -> Result<ConsoleCommand, CommandParseError>;

pub(crate) struct CommandSpec {
    name: String,
    help: String,
    arg_schema: String,
    parse: Box<ParseFn>,
}

pub(crate) struct ConsoleCommandRegistry {
    specs: Vec<CommandSpec>,
    lookup_by_lower_name: HashMap<String, usize>,
}

impl ConsoleCommandRegistry {
    pub(crate) fn new() -> Self {
        Self {
            specs: Vec::new(),
            lookup_by_lower_name: HashMap::new(),
        }
    }

    pub(crate) fn with_game_builtins() -> Self {
        let mut registry = Self::new();
        let builtins: [(&str, &str, &str, BuiltinParse); 15] = [
            ("help", "List commands", "", parse_help_command),
            (
                "nav",
                "Navigate to a state",
                "<state> [json] [--refresh]",
                parse_nav_command,
            ),
            ("back", "Pop the top dialog", "", parse_back_command),
            ("close", "Close to the nearest screen", "", parse_close_command),
            ("close-all", "Close every dialog", "", parse_close_all_command),
            ("action", "Run a dialog action", "<action>", parse_action_command),
            ("press", "Press a button of the current state", "<index:usize>", parse_press_command),
            ("tick", "Advance time", "<millis:u64>", parse_tick_command),
            (
                "path",
                "Find a path on the mission map",
                "<sx> <sy> <ex> <ey> [smooth]",
                parse_path_command,
            ),
            ("state", "Show navigation and campaign state", "", parse_state_command),
            ("enemies", "List living enemies", "", parse_enemies_command),
            ("set", "Change a setting", "<key> <value>", parse_set_command),
            ("persist", "Write settings and the navigation snapshot", "", parse_persist_command),
            ("resume", "Restore the saved navigation snapshot", "", parse_resume_command),
            ("quit", "Quit the game", "", parse_quit_command),
        ];
        for (name, help, arg_schema, parse) in builtins {
            registry
                .register(name, help, arg_schema, parse)
                .expect("built-in command registration should not fail");
        }
        registry
    }

    pub(crate) fn register<F>(
        &mut self,
        name: impl Into<String>,
        help: impl Into<String>,
        arg_schema: impl Into<String>,
        parse: F,
    ) -> Result<(), String>
    where
        F: Fn(&[String]) -> Result<ConsoleCommand, CommandParseError> + 'static,
    {
        let name = name.into();
        if name.trim().is_empty() {
            return Err("command name cannot be empty".to_string());
        }
        let lower = name.to_ascii_lowercase();
        if self.lookup_by_lower_name.contains_key(&lower) {
            return Err(format!("duplicate command registration: {name}"));
        }

        self.specs.push(CommandSpec {
            name,
            help: help.into(),
            arg_schema: arg_schema.into(),
            parse: Box::new(parse),
        });
        self.lookup_by_lower_name
            .insert(lower, self.specs.len() - 1);
        Ok(())
    }

    pub(crate) fn lookup(&self, input_name: &str) -> Option<&CommandSpec> {
        let lower = input_name.to_ascii_lowercase();
        let index = self.lookup_by_lower_name.get(&lower)?;
        self.specs.get(*index)
    }

    pub(crate) fn help_lines(&self) -> Vec<String> {
        self.specs
            .iter()
            .map(|spec| {
                if spec.arg_schema.is_empty() {
                    format!("{} - {}", spec.name, spec.help)
                } else {
                    format!("{} {} - {}", spec.name, spec.arg_schema, spec.help)
                }
            })
            .collect()
    }

    /// `Ok(None)` for blank input; `Err` holds the line to show the user.
    pub(crate) fn parse_line(&self, raw_line: &str) -> Result<Option<ConsoleCommand>, String> {
        let trimmed = raw_line.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }

        let tokens = tokenize_line(trimmed).map_err(|reason| format!("error: {reason}. usage: help"))?;
        let Some((command_name, args)) = tokens.split_first() else {
            return Ok(None);
        };
        let Some(spec) = self.lookup(command_name) else {
            return Err(format!(
                "error: unknown command '{}'. try: help",
                command_name
            ));
        };

        (spec.parse)(args)
            .map(Some)
            .map_err(|error| format!("error: {}. usage: {}", error.reason, error.usage))
    }
}

/// Splits on whitespace. `"..."` and `'...'` group text; the other quote kind is literal inside.
fn tokenize_line(line: &str) -> Result<Vec<String>, String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut pending = false;

    for ch in line.chars() {
        match (quote, ch) {
            (None, '"' | '\'') => {
                quote = Some(ch);
                pending = true;
            }
            (Some(open), c) if c == open => quote = None,
            (None, c) if c.is_whitespace() => {
                if pending {
                    tokens.push(std::mem::take(&mut current));
                    pending = false;
                }
            }
            _ => {
                current.push(ch);
                pending = true;
            }
        }
    }

    if quote.is_some() {
        return Err("unterminated quoted string".to_string());
    }
    if pending {
        tokens.push(current);
    }
    Ok(tokens)
}

fn parse_help_command(args: &[String]) -> Result<ConsoleCommand, CommandParseError> {
    require_no_args(args, "help")?;
    Ok(ConsoleCommand::Help)
}

fn parse_nav_command(args: &[String]) -> Result<ConsoleCommand, CommandParseError> {
    const USAGE: &str = "nav <state> [json] [--refresh]";
    let mut refresh = false;
    let mut positional = Vec::new();
    for arg in args {
        if arg == "--refresh" {
            refresh = true;
        } else {
            positional.push(arg);
        }
    }

    let (state, data) = match positional.as_slice() {
        [state] => ((*state).clone(), None),
        [state, raw] => {
            let data = serde_json::from_str::<Value>(raw)
                .map_err(|error| CommandParseError::new(format!("invalid json data: {error}"), USAGE))?;
            ((*state).clone(), Some(data))
        }
        _ => {
            return Err(CommandParseError::new(
                "expected <state> and optional json data",
                USAGE,
            ))
        }
    };
    Ok(ConsoleCommand::Navigate {
        state,
        data,
        refresh,
    })
}

fn parse_back_command(args: &[String]) -> Result<ConsoleCommand, CommandParseError> {
    require_no_args(args, "back")?;
    Ok(ConsoleCommand::Back)
}

fn parse_close_command(args: &[String]) -> Result<ConsoleCommand, CommandParseError> {
    require_no_args(args, "close")?;
    Ok(ConsoleCommand::Close)
}

fn parse_close_all_command(args: &[String]) -> Result<ConsoleCommand, CommandParseError> {
    require_no_args(args, "close-all")?;
    Ok(ConsoleCommand::CloseAll)
}

fn parse_action_command(args: &[String]) -> Result<ConsoleCommand, CommandParseError> {
    if args.len() != 1 {
        return Err(CommandParseError::new(
            "expected exactly one argument <action>",
            "action <action>",
        ));
    }
    Ok(ConsoleCommand::Action {
        raw: args[0].clone(),
    })
}

fn parse_press_command(args: &[String]) -> Result<ConsoleCommand, CommandParseError> {
    const USAGE: &str = "press <index>";
    if args.len() != 1 {
        return Err(CommandParseError::new(
            "expected exactly one argument <index>",
            USAGE,
        ));
    }
    let index = args[0].parse::<usize>().map_err(|_| {
        CommandParseError::new(format!("invalid button index '{}' (expected usize)", args[0]), USAGE)
    })?;
    Ok(ConsoleCommand::Press { index })
}

fn parse_tick_command(args: &[String]) -> Result<ConsoleCommand, CommandParseError> {
    const USAGE: &str = "tick <millis>";
    if args.len() != 1 {
        return Err(CommandParseError::new(
            "expected exactly one argument <millis>",
            USAGE,
        ));
    }
    let millis = args[0].parse::<u64>().map_err(|_| {
        CommandParseError::new(format!("invalid duration '{}' (expected u64)", args[0]), USAGE)
    })?;
    Ok(ConsoleCommand::Tick { millis })
}

fn parse_path_command(args: &[String]) -> Result<ConsoleCommand, CommandParseError> {
    const USAGE: &str = "path <sx> <sy> <ex> <ey> [smooth]";
    if args.len() != 4 && args.len() != 5 {
        return Err(CommandParseError::new(
            "expected four coordinates and an optional smooth flag",
            USAGE,
        ));
    }
    let mut coords = [0.0_f32; 4];
    for (slot, raw) in coords.iter_mut().zip(args) {
        *slot = raw.parse::<f32>().map_err(|_| {
            CommandParseError::new(format!("invalid coordinate '{raw}' (expected f32)"), USAGE)
        })?;
    }
    let smooth = match args.get(4).map(String::as_str) {
        None | Some("smooth") | Some("true") => true,
        Some("raw") | Some("false") => false,
        Some(other) => {
            return Err(CommandParseError::new(
                format!("invalid smooth flag '{other}' (expected smooth|raw)"),
                USAGE,
            ))
        }
    };
    Ok(ConsoleCommand::Path {
        start: (coords[0], coords[1]),
        end: (coords[2], coords[3]),
        smooth,
    })
}

fn parse_state_command(args: &[String]) -> Result<ConsoleCommand, CommandParseError> {
    require_no_args(args, "state")?;
    Ok(ConsoleCommand::State)
}

fn parse_enemies_command(args: &[String]) -> Result<ConsoleCommand, CommandParseError> {
    require_no_args(args, "enemies")?;
    Ok(ConsoleCommand::Enemies)
}

fn parse_set_command(args: &[String]) -> Result<ConsoleCommand, CommandParseError> {
    if args.len() != 2 {
        return Err(CommandParseError::new(
            "expected <key> <value>",
            "set <key> <value>",
        ));
    }
    Ok(ConsoleCommand::Set {
        key: args[0].clone(),
        value: parse_setting_value(&args[1]),
    })
}

fn parse_setting_value(raw: &str) -> SettingValue {
    if let Ok(value) = raw.parse::<bool>() {
        return SettingValue::Bool(value);
    }
    if let Ok(value) = raw.parse::<i64>() {
        return SettingValue::Int(value);
    }
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() => SettingValue::Float(value),
        _ => SettingValue::Text(raw.to_string()),
    }
}

fn parse_persist_command(args: &[String]) -> Result<ConsoleCommand, CommandParseError> {
    require_no_args(args, "persist")?;
    Ok(ConsoleCommand::Persist)
}

fn parse_resume_command(args: &[String]) -> Result<ConsoleCommand, CommandParseError> {
    require_no_args(args, "resume")?;
    Ok(ConsoleCommand::Resume)
}

fn parse_quit_command(args: &[String]) -> Result<ConsoleCommand, CommandParseError> {
    require_no_args(args, "quit")?;
    Ok(ConsoleCommand::Quit)
}

fn require_no_args(args: &[String], usage: &str) -> Result<(), CommandParseError> {
    if args.is_empty() {
        Ok(())
    } else {
        Err(CommandParseError::new("unexpected extra arguments", usage))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn parse(line: &str) -> Result<Option<ConsoleCommand>, String> {
        ConsoleCommandRegistry::with_game_builtins().parse_line(line)
    }

    #[test]
    fn help_lists_commands_in_registration_order() {
        let lines = ConsoleCommandRegistry::with_game_builtins().help_lines();
        assert_eq!(lines[0], "help - List commands");
        assert_eq!(lines[1], "nav <state> [json] [--refresh] - Navigate to a state");
        assert_eq!(lines[6], "press <index:usize> - Press a button of the current state");
        assert_eq!(lines.last().map(String::as_str), Some("quit - Quit the game"));
        assert_eq!(lines.len(), 15);
    }

    #[test]
    fn tokenizer_groups_quoted_text() {
        assert_eq!(
            tokenize_line(r#"set  gameplay.difficulty "very hard" "#).expect("tokens"),
            vec!["set", "gameplay.difficulty", "very hard"]
        );
        assert_eq!(
            tokenize_line(r#"nav agent-offer '{"name":"Vex"}'"#).expect("tokens"),
            vec!["nav", "agent-offer", r#"{"name":"Vex"}"#]
        );
        assert_eq!(tokenize_line(r#"set key """#).expect("tokens"), vec!["set", "key", ""]);
        assert!(tokenize_line(r#"nav "open"#).is_err());
    }

    #[test]
    fn nav_accepts_json_and_refresh_in_any_order() {
        assert_eq!(
            parse(r#"NAV --refresh recruit '{"credits":5}'"#).expect("parse"),
            Some(ConsoleCommand::Navigate {
                state: "recruit".to_string(),
                data: Some(json!({"credits": 5})),
                refresh: true,
            })
        );
        let error = parse("nav recruit {oops").expect_err("bad json");
        assert!(error.starts_with("error: invalid json data"));
        assert!(error.ends_with("usage: nav <state> [json] [--refresh]"));
    }

    #[test]
    fn unknown_and_malformed_commands_report_usage() {
        assert_eq!(
            parse("teleport home").expect_err("unknown"),
            "error: unknown command 'teleport'. try: help"
        );
        assert_eq!(
            parse("back now").expect_err("extra"),
            "error: unexpected extra arguments. usage: back"
        );
        assert_eq!(
            parse("press two").expect_err("index"),
            "error: invalid button index 'two' (expected usize). usage: press <index>"
        );
        assert_eq!(parse("   ").expect("blank"), None);
    }

    #[test]
    fn path_and_set_parse_typed_arguments() {
        assert_eq!(
            parse("path 0 0 5.5 2 raw").expect("parse"),
            Some(ConsoleCommand::Path {
                start: (0.0, 0.0),
                end: (5.5, 2.0),
                smooth: false,
            })
        );
        assert_eq!(
            parse("set audio.master_volume 0.25").expect("parse"),
            Some(ConsoleCommand::Set {
                key: "audio.master_volume".to_string(),
                value: SettingValue::Float(0.25),
            })
        );
        assert_eq!(
            parse("set ui.clear_data_on_close true").expect("parse"),
            Some(ConsoleCommand::Set {
                key: "ui.clear_data_on_close".to_string(),
                value: SettingValue::Bool(true),
            })
        );
        assert_eq!(
            parse("set gameplay.difficulty hard").expect("parse"),
            Some(ConsoleCommand::Set {
                key: "gameplay.difficulty".to_string(),
                value: SettingValue::Text("hard".to_string()),
            })
        );
    }
}
