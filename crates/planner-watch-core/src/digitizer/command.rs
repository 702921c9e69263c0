use serde_json::json;
use std::io::{Read, Write};
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::debug;

use super::output::parse_output;
use super::{Extractor, ServiceError, Uploader};
use crate::config::CommandConfig;
use crate::models::{ExtractionOutput, DATE_FORMAT};

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const MAX_MESSAGE_CHARS: usize = 500;

/// Runs the configured digitizer once per image and parses what it prints.
#[derive(Debug, Clone)]
pub struct CommandExtractor {
    config: CommandConfig,
}

impl CommandExtractor {
    pub fn new(config: CommandConfig) -> Self {
        Self { config }
    }

    pub fn validate_environment(&self) -> Vec<String> {
        validate_command("extractor", &self.config)
    }
}

impl Extractor for CommandExtractor {
    fn extract(&self, image: &Path, timeout: Duration) -> Result<ExtractionOutput, ServiceError> {
        let stdout = run_command(&self.config, Some(image), None, timeout)?;
        let parser_type = if self.config.parser_type.is_empty() {
            "text"
        } else {
            &self.config.parser_type
        };
        Ok(parse_output(&stdout, parser_type))
    }
}

/// Hands extracted data to the record store through a program that reads the
/// payload as JSON on stdin.
#[derive(Debug, Clone)]
pub struct CommandUploader {
    config: CommandConfig,
}

impl CommandUploader {
    pub fn new(config: CommandConfig) -> Self {
        Self { config }
    }

    pub fn validate_environment(&self) -> Vec<String> {
        validate_command("uploader", &self.config)
    }
}

impl Uploader for CommandUploader {
    fn upload(
        &self,
        image: &Path,
        payload: &ExtractionOutput,
        timeout: Duration,
    ) -> Result<(), ServiceError> {
        let body = json!({
            "image": image.display().to_string(),
            "date": payload.date.map(|d| d.format(DATE_FORMAT).to_string()),
            "data": payload.data,
        });
        let input = serde_json::to_vec(&body).map_err(|e| ServiceError::Parse(e.to_string()))?;
        run_command(&self.config, Some(image), Some(input), timeout)?;
        Ok(())
    }
}

/// Report problems that would make every invocation of `config` fail.
pub fn validate_command(label: &str, config: &CommandConfig) -> Vec<String> {
    let mut issues = Vec::new();

    if config.program.trim().is_empty() {
        issues.push(format!("No {} program configured", label));
    } else if which::which(&config.program).is_err() {
        issues.push(format!(
            "{} program not found: {}",
            capitalize(label),
            config.program
        ));
    }

    if let Some(dir) = &config.working_dir {
        if !dir.is_dir() {
            issues.push(format!(
                "{} working directory not found: {}",
                capitalize(label),
                dir.display()
            ));
        }
    }

    issues
}

fn capitalize(label: &str) -> String {
    let mut chars = label.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Spawn `config`, wait at most `timeout`, and return its stdout.
///
/// `{path}` in the arguments is replaced with `image`. A non-zero exit is a
/// `Status` error carrying stderr (or stdout when stderr is empty). On timeout
/// the child is killed and reaped before returning.
pub(crate) fn run_command(
    config: &CommandConfig,
    image: Option<&Path>,
    input: Option<Vec<u8>>,
    timeout: Duration,
) -> Result<String, ServiceError> {
    let mut command = Command::new(&config.program);
    command
        .args(substitute_args(&config.args, image))
        .stdin(if input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(dir) = &config.working_dir {
        command.current_dir(dir);
    }

    debug!("Running {} {:?}", config.program, config.args);
    let mut child = command.spawn()?;

    if let (Some(input), Some(mut stdin)) = (input, child.stdin.take()) {
        // A child that exits without reading its input is reported through its status.
        thread::spawn(move || {
            let _ = stdin.write_all(&input);
        });
    }
    let stdout = spawn_reader(child.stdout.take());
    let stderr = spawn_reader(child.stderr.take());

    let started = Instant::now();
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if started.elapsed() > timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(ServiceError::Timeout(timeout));
                }
                thread::sleep(POLL_INTERVAL.min(timeout));
            }
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(e.into());
            }
        }
    };

    let stdout = join_reader(stdout);
    let stderr = join_reader(stderr);

    if !status.success() {
        let detail = if stderr.trim().is_empty() { &stdout } else { &stderr };
        return Err(ServiceError::Status {
            code: status.code(),
            message: truncate(detail.trim()),
        });
    }

    Ok(stdout)
}

fn substitute_args(args: &[String], image: Option<&Path>) -> Vec<String> {
    let Some(image) = image else {
        return args.to_vec();
    };
    let path = image.display().to_string();
    args.iter().map(|arg| arg.replace("{path}", &path)).collect()
}

fn spawn_reader<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<String>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).into_owned()
        })
    })
}

fn join_reader(handle: Option<JoinHandle<String>>) -> String {
    handle
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

fn truncate(message: &str) -> String {
    if message.chars().count() <= MAX_MESSAGE_CHARS {
        return message.to_string();
    }
    let mut short: String = message.chars().take(MAX_MESSAGE_CHARS).collect();
    short.push_str("...");
    short
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::fs;
    use tempfile::tempdir;

    fn shell(script: &str, extra: &[&str]) -> CommandConfig {
        let mut args = vec!["-c".to_string(), script.to_string()];
        args.extend(extra.iter().map(|a| a.to_string()));
        CommandConfig {
            program: "sh".to_string(),
            args,
            working_dir: None,
            parser_type: "shell".to_string(),
        }
    }

    #[test]
    fn test_extractor_parses_json_line() {
        let extractor = CommandExtractor::new(shell(
            r#"echo "warming up"; echo '{"date": "2025-05-28", "mood": "ok"}'"#,
            &[],
        ));
        let output = extractor
            .extract(Path::new("/drop/page.jpg"), Duration::from_secs(10))
            .unwrap();
        assert_eq!(output.date, NaiveDate::from_ymd_opt(2025, 5, 28));
        assert_eq!(output.data["mood"], "ok");
    }

    #[test]
    fn test_extractor_substitutes_path() {
        let extractor = CommandExtractor::new(shell(r#"echo "seen $0""#, &["{path}"]));
        let output = extractor
            .extract(Path::new("/drop/page.jpg"), Duration::from_secs(10))
            .unwrap();
        assert_eq!(output.data["parser_type"], "shell");
        assert!(output.data["raw_output"]
            .as_str()
            .unwrap()
            .contains("seen /drop/page.jpg"));
    }

    #[test]
    fn test_non_zero_exit_is_status_error() {
        let extractor = CommandExtractor::new(shell("echo 'model offline' >&2; exit 3", &[]));
        match extractor.extract(Path::new("/drop/page.jpg"), Duration::from_secs(10)) {
            Err(ServiceError::Status { code, message }) => {
                assert_eq!(code, Some(3));
                assert_eq!(message, "model offline");
            }
            other => panic!("expected status error, got {:?}", other),
        }
    }

    #[test]
    fn test_slow_program_is_killed_on_timeout() {
        let extractor = CommandExtractor::new(shell("sleep 5", &[]));
        let started = Instant::now();
        let result = extractor.extract(Path::new("/drop/page.jpg"), Duration::from_millis(200));
        assert!(matches!(result, Err(ServiceError::Timeout(_))));
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn test_uploader_writes_payload_to_stdin() {
        let dir = tempdir().unwrap();
        let sink = dir.path().join("upload.json");
        let uploader = CommandUploader::new(shell(
            r#"cat > "$0""#,
            &[sink.to_str().unwrap()],
        ));
        let payload = ExtractionOutput {
            date: NaiveDate::from_ymd_opt(2025, 5, 30),
            data: json!({"tasks": ["water plants"]}),
        };

        uploader
            .upload(Path::new("/drop/page.jpg"), &payload, Duration::from_secs(10))
            .unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&sink).unwrap()).unwrap();
        assert_eq!(written["date"], "2025-05-30");
        assert_eq!(written["image"], "/drop/page.jpg");
        assert_eq!(written["data"]["tasks"][0], "water plants");
    }

    #[test]
    fn test_validate_environment() {
        assert!(CommandExtractor::new(shell("true", &[]))
            .validate_environment()
            .is_empty());

        let missing = CommandExtractor::new(CommandConfig {
            program: "planner-digitizer-that-does-not-exist".to_string(),
            working_dir: Some("/definitely/not/here".into()),
            ..CommandConfig::default()
        });
        let issues = missing.validate_environment();
        assert_eq!(issues.len(), 2);
        assert!(issues[0].starts_with("Extractor program not found"));

        let empty = CommandUploader::new(CommandConfig::default());
        assert_eq!(empty.validate_environment(), vec!["No uploader program configured"]);
    }
}
