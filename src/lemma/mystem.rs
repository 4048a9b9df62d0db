//! Driver for the Yandex Mystem morphological analyzer binary.

use crate::config::LemmatizerConfig;
use crate::error::{EvalError, Result};
use crate::lemma::Lemmatizer;
use serde::Deserialize;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;

/// `-c` copies the whole input (spaces, punctuation), `-d` disambiguates
/// in context so each word gets one analysis first.
const MYSTEM_ARGS: [&str; 4] = ["-c", "-d", "--format", "json"];

#[derive(Debug, Deserialize)]
struct MystemToken {
    text: String,
    #[serde(default)]
    analysis: Option<Vec<MystemAnalysis>>,
}

#[derive(Debug, Deserialize)]
struct MystemAnalysis {
    lex: String,
}

/// Join Mystem's JSON output: lemma of the first analysis for words,
/// original text for everything else.
fn join_lemmas(output: &str) -> Result<String> {
    let mut joined = String::new();
    for line in output.lines().filter(|l| !l.trim().is_empty()) {
        let tokens: Vec<MystemToken> = serde_json::from_str(line)
            .map_err(|e| EvalError::Lemmatizer(format!("Unparsable mystem output {:?}: {}", line, e)))?;
        for token in tokens {
            match token.analysis.as_ref().and_then(|a| a.first()) {
                Some(analysis) => joined.push_str(&analysis.lex),
                // line breaks come back as a literal "\s"
                None if token.text == "\\s" => joined.push(' '),
                None => joined.push_str(&token.text),
            }
        }
    }
    Ok(joined.trim().to_string())
}

/// A running `mystem` answering one JSON line per input line
struct MystemProcess {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl MystemProcess {
    async fn analyze(&mut self, input: &str) -> Result<String> {
        let io_error = |e: std::io::Error| EvalError::Lemmatizer(format!("mystem pipe failed: {}", e));

        self.stdin.write_all(input.as_bytes()).await.map_err(io_error)?;
        self.stdin.write_all(b"\n").await.map_err(io_error)?;
        self.stdin.flush().await.map_err(io_error)?;

        let mut line = String::new();
        loop {
            line.clear();
            if self.stdout.read_line(&mut line).await.map_err(io_error)? == 0 {
                return Err(EvalError::Lemmatizer(match self.child.try_wait() {
                    Ok(Some(status)) => format!("mystem exited with {}", status),
                    _ => "mystem closed its output".to_string(),
                }));
            }
            if !line.trim().is_empty() {
                return Ok(line);
            }
        }
    }
}

/// Lemmatizes through one long-lived `mystem` process
///
/// The process is started on first use and reused for every later query.
/// Queries are serialized through it. After a failure or timeout it is
/// killed and the next query starts a fresh one.
pub struct MystemLemmatizer {
    binary: PathBuf,
    timeout: Duration,
    process: Mutex<Option<MystemProcess>>,
}

impl MystemLemmatizer {
    pub fn new(binary: PathBuf, timeout: Duration) -> Self {
        Self {
            binary,
            timeout,
            process: Mutex::new(None),
        }
    }

    pub fn from_config(config: &LemmatizerConfig) -> Self {
        Self::new(config.mystem_path.clone(), Duration::from_secs(config.timeout_secs))
    }

    fn spawn(&self) -> Result<MystemProcess> {
        let mut child = Command::new(&self.binary)
            .args(MYSTEM_ARGS)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                EvalError::Lemmatizer(format!("Failed to start {}: {}", self.binary.display(), e))
            })?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(EvalError::Lemmatizer("mystem pipes unavailable".to_string()));
        };
        log::debug!("Started {} (pid {:?})", self.binary.display(), child.id());

        Ok(MystemProcess {
            child,
            stdin,
            stdout: BufReader::new(stdout),
        })
    }

    async fn run(&self, input: &str) -> Result<String> {
        let mut slot = self.process.lock().await;
        let mut process = match slot.take() {
            Some(process) => process,
            None => self.spawn()?,
        };

        // a failed process is dropped here, which kills it
        let output = tokio::time::timeout(self.timeout, process.analyze(input))
            .await
            .map_err(|_| {
                EvalError::Lemmatizer(format!("mystem did not answer within {:?}", self.timeout))
            })??;

        *slot = Some(process);
        Ok(output)
    }
}

impl Lemmatizer for MystemLemmatizer {
    async fn lemmatize(&self, text: &str) -> Result<String> {
        // One query per line; embedded newlines would split the answer
        let input = text.replace(['\r', '\n'], " ");
        let output = self.run(&input).await?;
        let lemmas = join_lemmas(&output)?;
        log::debug!("Lemmatized {:?} -> {:?}", text, lemmas);
        Ok(lemmas)
    }
}
