use std::{collections::HashMap, env, fs, path::PathBuf, sync::Arc};

use regex::Regex;
use serde::Deserialize;

use super::Unit;
use crate::{
    builtin::{Command, FileCopy, Print, Service, Wait},
    error::{ColonyError, Result},
    output::OutputMode,
    util::{parse_duration, parse_timeout},
};

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct CopySpec {
    pub from: PathBuf,
    pub to: PathBuf,
    #[serde(default)]
    pub checksum: bool,
}

/// A task as written in the task file.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct TaskSpec {
    /// The key of the task's table.
    #[serde(skip)]
    pub id: String,
    pub command: Option<String>,
    #[serde(default)]
    pub service: bool,
    pub wait: Option<String>,
    pub print: Option<String>,
    pub copy: Option<CopySpec>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub timeout: Option<String>,
}

/// Settings applied to every task built from the file.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub default_timeout: Option<String>,
    pub output: OutputMode,
}

impl TaskSpec {
    fn kinds(&self) -> usize {
        [
            self.command.is_some(),
            self.wait.is_some(),
            self.print.is_some(),
            self.copy.is_some(),
        ]
        .into_iter()
        .filter(|set| *set)
        .count()
    }

    fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(ColonyError::Config(
                "Task names must not be empty".to_string(),
            ));
        }
        if self.kinds() != 1 {
            return Err(ColonyError::Config(format!(
                "Task '{}' must set exactly one of command, wait, print or copy",
                self.id
            )));
        }
        if self.service && self.command.is_none() {
            return Err(ColonyError::Config(format!(
                "Task '{}' is a service but has no command",
                self.id
            )));
        }
        if let Some(wait) = &self.wait {
            parse_duration(wait)?;
        }
        parse_timeout(self.timeout.as_deref(), None)?;
        Ok(())
    }

    /// Builds the runnable task.
    pub fn unit(&self, settings: &Settings) -> Result<Unit> {
        self.validate()?;

        if let Some(command) = &self.command {
            if self.service {
                return Ok(Unit::LongRunning(Arc::new(Service::new(command))));
            }
            let timeout = parse_timeout(
                self.timeout.as_deref(),
                settings.default_timeout.as_deref(),
            )?;
            let task = Command::new(command)
                .timeout(timeout)
                .output(settings.output);
            return Ok(Unit::Plain(Arc::new(task)));
        }

        if let Some(wait) = &self.wait {
            return Ok(Unit::Plain(Arc::new(Wait(parse_duration(wait)?))));
        }

        if let Some(message) = &self.print {
            return Ok(Unit::Plain(Arc::new(Print::new(message))));
        }

        match &self.copy {
            Some(copy) if copy.checksum => Ok(Unit::Plain(Arc::new(FileCopy::checksummed(
                &copy.from, &copy.to,
            )))),
            Some(copy) => Ok(Unit::Plain(Arc::new(FileCopy::new(&copy.from, &copy.to)))),
            None => Err(ColonyError::Config(format!(
                "Task '{}' has nothing to do",
                self.id
            ))),
        }
    }

    /// One-line summary for dry runs.
    pub fn describe(&self) -> String {
        if let Some(command) = &self.command {
            if self.service {
                return format!("service: {}", command);
            }
            return format!("run: {}", command);
        }
        if let Some(wait) = &self.wait {
            return format!("wait: {}", wait);
        }
        if let Some(message) = &self.print {
            return format!("print: {}", message);
        }
        match &self.copy {
            Some(copy) => format!("copy: {} -> {}", copy.from.display(), copy.to.display()),
            None => String::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Config {
    #[serde(rename = "task", default)]
    tasks: HashMap<String, TaskSpec>,
    config: Option<ConfigSection>,
    #[serde(default)]
    variables: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct ConfigSection {
    default: Option<String>,
    default_timeout: Option<String>,
    output: Option<OutputMode>,
}

#[derive(Debug)]
pub struct TaskConfiguration {
    /// Sorted by id.
    pub tasks: Vec<TaskSpec>,
    pub default_task: Option<String>,
    pub default_timeout: Option<String>,
    pub output: Option<OutputMode>,
}

pub fn load_tasks(config_path: &str) -> Result<TaskConfiguration> {
    let contents = fs::read_to_string(config_path)?;
    parse_tasks(&contents)
}

pub fn parse_tasks(contents: &str) -> Result<TaskConfiguration> {
    let config: Config = toml::from_str(contents)?;
    process_config(config)
}

fn process_config(config: Config) -> Result<TaskConfiguration> {
    let default_task = config.config.as_ref().and_then(|c| c.default.clone());
    let default_timeout = config
        .config
        .as_ref()
        .and_then(|c| c.default_timeout.clone());
    let output = config.config.as_ref().and_then(|c| c.output);

    let mut variables = config.variables;
    add_builtin_variables(&mut variables);

    let mut tasks: Vec<TaskSpec> = config
        .tasks
        .into_iter()
        .map(|(name, mut task)| {
            task.id = name;
            substitute_variables_in_task(&mut task, &variables);
            task
        })
        .collect();
    tasks.sort_by(|a, b| a.id.cmp(&b.id));

    for task in &tasks {
        task.validate()?;
    }

    Ok(TaskConfiguration {
        tasks,
        default_task,
        default_timeout,
        output,
    })
}

fn add_builtin_variables(variables: &mut HashMap<String, String>) {
    for (key, value) in env::vars() {
        variables.insert(format!("ENV_{}", key), value);
    }

    if let Ok(pwd) = env::current_dir() {
        variables.insert("PWD".to_string(), pwd.to_string_lossy().to_string());
    }
}

fn substitute_variables_in_task(task: &mut TaskSpec, variables: &HashMap<String, String>) {
    let substitute = |text: &str| substitute_variables(text, variables);

    task.command = task.command.as_deref().map(substitute);
    task.print = task.print.as_deref().map(substitute);

    if let Some(copy) = &mut task.copy {
        copy.from = PathBuf::from(substitute(&copy.from.to_string_lossy()));
        copy.to = PathBuf::from(substitute(&copy.to.to_string_lossy()));
    }
}

fn substitute_variables(text: &str, variables: &HashMap<String, String>) -> String {
    let braced_regex = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid regex");
    let simple_regex = Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)\b").expect("valid regex");

    let result = braced_regex
        .replace_all(text, |caps: &regex::Captures| lookup(caps, variables))
        .to_string();

    simple_regex
        .replace_all(&result, |caps: &regex::Captures| lookup(caps, variables))
        .to_string()
}

fn lookup(caps: &regex::Captures, variables: &HashMap<String, String>) -> String {
    variables
        .get(&caps[1])
        .cloned()
        .unwrap_or_else(|| caps[0].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tasks_and_settings() {
        let config = parse_tasks(
            r#"
            [config]
            default = "build"
            default_timeout = "5m"
            output = "stream"

            [task.build]
            command = "make"
            dependencies = ["fmt"]

            [task.fmt]
            print = "formatting"
            "#,
        )
        .unwrap();

        assert_eq!(config.default_task.as_deref(), Some("build"));
        assert_eq!(config.default_timeout.as_deref(), Some("5m"));
        assert_eq!(config.output, Some(OutputMode::Stream));

        let ids: Vec<&str> = config.tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["build", "fmt"]);
        assert_eq!(config.tasks[0].dependencies, vec!["fmt"]);
    }

    #[test]
    fn substitutes_variables() {
        let config = parse_tasks(
            r#"
            [variables]
            OUT = "target"

            [task.build]
            command = "mkdir -p ${OUT} && touch $OUT/done"

            [task.assets]
            copy = { from = "a.txt", to = "${OUT}/a.txt" }
            "#,
        )
        .unwrap();

        let build = config.tasks.iter().find(|t| t.id == "build").unwrap();
        assert_eq!(
            build.command.as_deref(),
            Some("mkdir -p target && touch target/done")
        );

        let assets = config.tasks.iter().find(|t| t.id == "assets").unwrap();
        assert_eq!(
            assets.copy.as_ref().unwrap().to,
            PathBuf::from("target/a.txt")
        );
    }

    #[test]
    fn unknown_variables_are_kept() {
        let vars = HashMap::new();
        assert_eq!(substitute_variables("echo $NOPE", &vars), "echo $NOPE");
    }

    #[test]
    fn task_needs_exactly_one_kind() {
        let err = parse_tasks(
            r#"
            [task.both]
            command = "true"
            print = "hi"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ColonyError::Config(_)));

        let err = parse_tasks("[task.empty]\ndependencies = []\n").unwrap_err();
        assert!(matches!(err, ColonyError::Config(_)));
    }

    #[test]
    fn ids_come_from_table_keys() {
        let config = parse_tasks(
            r#"
            [task.first]
            id = "shared"
            print = "one"

            [task.second]
            id = "shared"
            print = "two"
            "#,
        )
        .unwrap();

        let ids: Vec<&str> = config.tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["first", "second"]);
    }

    #[test]
    fn empty_task_name_is_rejected() {
        let err = parse_tasks("[task.\"\"]\nprint = \"hi\"\n").unwrap_err();
        assert!(matches!(err, ColonyError::Config(ref msg) if msg.contains("empty")));
    }

    #[test]
    fn invalid_wait_is_rejected() {
        let err = parse_tasks("[task.pause]\nwait = \"later\"\n").unwrap_err();
        assert!(matches!(err, ColonyError::Config(_)));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let err = parse_tasks("[task.build\ncommand = 1").unwrap_err();
        assert!(matches!(err, ColonyError::Parse(_)));
    }

    #[test]
    fn services_are_long_running() {
        let spec = TaskSpec {
            id: "db".to_string(),
            command: Some("sleep 60".to_string()),
            service: true,
            ..Default::default()
        };

        let unit = spec.unit(&Settings::default()).unwrap();
        assert!(matches!(unit, Unit::LongRunning(_)));
        assert_eq!(spec.describe(), "service: sleep 60");
    }
}
