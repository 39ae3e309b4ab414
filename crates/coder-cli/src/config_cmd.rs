use crate::config::{Config, ConfigError, ConfigPaths, validate_strategy, validate_threshold};
use clap::Args;
use std::process::Command;

#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// Print config with secrets redacted
    #[arg(long)]
    pub print: bool,

    /// Edit config in $VISUAL or $EDITOR
    #[arg(long)]
    pub edit: bool,

    /// Set a config value (dotted key=value)
    #[arg(long, value_name = "key=value")]
    pub set: Vec<String>,
}

/// What one `coder config` invocation does.
#[derive(Debug, Clone, PartialEq)]
enum Action<'a> {
    Show,
    Edit,
    Assign { pairs: &'a [String], show: bool },
}

impl ConfigArgs {
    fn action(&self) -> Result<Action<'_>, ConfigError> {
        match (self.edit, self.set.is_empty()) {
            (true, true) if !self.print => Ok(Action::Edit),
            (true, _) => Err(ConfigError::Validation(
                "--edit works alone; drop --set and --print".into(),
            )),
            (false, true) => Ok(Action::Show),
            (false, false) => Ok(Action::Assign {
                pairs: &self.set,
                show: self.print,
            }),
        }
    }
}

pub fn run(args: &ConfigArgs, paths: &ConfigPaths) -> Result<(), ConfigError> {
    let action = args.action()?;
    let mut config = Config::load_or_create(paths)?;
    match action {
        Action::Show => print_redacted(&config),
        Action::Edit => {
            open_in_editor(paths)?;
            Config::load(paths)?.validate()
        }
        Action::Assign { pairs, show } => {
            for pair in pairs {
                apply_set(&mut config, pair)?;
            }
            config.validate()?;
            Config::write(paths, &config)?;
            if show {
                print_redacted(&config)?;
            }
            Ok(())
        }
    }
}

fn print_redacted(config: &Config) -> Result<(), ConfigError> {
    println!("{}", toml::to_string_pretty(&config.redacted())?);
    Ok(())
}

/// Prefers `$VISUAL`, then `$EDITOR`.
fn open_in_editor(paths: &ConfigPaths) -> Result<(), ConfigError> {
    let raw = ["VISUAL", "EDITOR"]
        .iter()
        .find_map(|key| std::env::var(key).ok().filter(|value| !value.trim().is_empty()))
        .ok_or_else(|| {
            ConfigError::Validation("no editor configured; set $VISUAL or $EDITOR".into())
        })?;
    let words = editor_words(&raw)?;
    let Some((program, flags)) = words.split_first() else {
        return Err(ConfigError::Validation("editor command is empty".into()));
    };
    let status = Command::new(program)
        .args(flags)
        .arg(&paths.config_path)
        .status()?;
    if status.success() {
        Ok(())
    } else {
        Err(ConfigError::Validation(format!(
            "{program} exited with {status}"
        )))
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Quote {
    Open(char),
    Closed,
}

/// Shell-style word splitting for an editor command line.
fn editor_words(command: &str) -> Result<Vec<String>, ConfigError> {
    let mut words: Vec<String> = Vec::new();
    let mut word: Option<String> = None;
    let mut quote = Quote::Closed;
    let mut chars = command.chars();

    while let Some(ch) = chars.next() {
        match (quote, ch) {
            (Quote::Open(open), ch) if ch == open => quote = Quote::Closed,
            (Quote::Closed, '\'' | '"') => {
                quote = Quote::Open(ch);
                word.get_or_insert_with(String::new);
            }
            (Quote::Open('\''), ch) => word.get_or_insert_with(String::new).push(ch),
            (_, '\\') => {
                let escaped = chars.next().unwrap_or('\\');
                word.get_or_insert_with(String::new).push(escaped);
            }
            (Quote::Closed, ch) if ch.is_whitespace() => words.extend(word.take()),
            (_, ch) => word.get_or_insert_with(String::new).push(ch),
        }
    }

    if let Quote::Open(open) = quote {
        return Err(ConfigError::Validation(format!(
            "editor command has an unclosed {open} quote"
        )));
    }
    words.extend(word);
    Ok(words)
}

fn apply_set(config: &mut Config, assignment: &str) -> Result<(), ConfigError> {
    let (key, value) = assignment
        .split_once('=')
        .ok_or_else(|| ConfigError::Validation("expected key=value for --set".into()))?;
    let key = key.trim();
    let value = value.trim();
    match key {
        "classify.strategy" => {
            validate_strategy(key, value)?;
            config.classify.strategy = value.to_string();
        }
        "classify.threshold" => {
            let parsed = parse_f64(value, key)?;
            validate_threshold(key, parsed)?;
            config.classify.threshold = parsed;
        }
        "classify.dictionary" => {
            config.classify.dictionary = value.to_string();
        }
        "llm.enabled" => {
            config.llm.enabled = parse_bool(value, key)?;
        }
        "llm.provider" => {
            config.llm.provider = value.to_string();
        }
        "llm.model" => {
            config.llm.model = value.to_string();
        }
        "llm.api_key" => {
            config.llm.api_key = value.to_string();
        }
        "output.dir" => {
            config.output.dir = value.to_string();
        }
        _ => {
            return Err(ConfigError::Validation(format!(
                "unknown config key: {key}"
            )));
        }
    }
    Ok(())
}

fn parse_bool(value: &str, key: &str) -> Result<bool, ConfigError> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(ConfigError::Validation(format!(
            "{key} expects true or false"
        ))),
    }
}

fn parse_f64(value: &str, key: &str) -> Result<f64, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::Validation(format!("{key} expects a number")))
}
