//! One-time confirmation gate guarding every installation action.
//!
//! Installers run with the invoking user's full privileges and nothing is
//! rolled back on failure, so the first resource constructed through a
//! [`BuildContext`](crate::context::BuildContext) asks for explicit consent.
//! Once given, consent holds for the lifetime of the gate.
use std::collections::VecDeque;
use std::io::{self, BufRead as _, Write as _};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;

/// Text shown before the confirmation question.
pub const AGREEMENT_TEXT: &str = "\
Resources are downloaded and installed with your full user privileges.
Installers are not sandboxed and nothing is rolled back if a step fails.
Only continue if you trust every source listed in your resource files.";

/// The question asked until a yes/no answer is given.
pub const AGREEMENT_QUESTION: &str = "Do you agree to continue? [y/n] ";

/// Raised when the user refuses (or cannot answer) the agreement prompt.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("installation agreement declined")]
pub struct AgreementDeclined;

/// Source of answers to the agreement question.
#[cfg_attr(test, mockall::automock)]
pub trait Prompt: Send + Sync {
    /// Show `question` and return the answer, or `None` at end of input.
    ///
    /// # Errors
    ///
    /// Returns an error if the answer cannot be read.
    fn ask(&self, question: &str) -> io::Result<Option<String>>;
}

/// Prompt on the controlling terminal (stdout/stdin).
#[derive(Debug, Default)]
pub struct TerminalPrompt;

impl Prompt for TerminalPrompt {
    fn ask(&self, question: &str) -> io::Result<Option<String>> {
        let mut stdout = io::stdout().lock();
        write!(stdout, "{question}")?;
        stdout.flush()?;
        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line))
    }
}

/// Prompt that replays a fixed list of answers, then reports end of input.
///
/// Used for non-interactive runs and tests.
#[derive(Debug, Default)]
pub struct ScriptedPrompt {
    answers: Mutex<VecDeque<String>>,
}

impl ScriptedPrompt {
    /// Create a prompt answering with `answers` in order.
    #[must_use]
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: Mutex::new(answers.into_iter().map(Into::into).collect()),
        }
    }
}

impl Prompt for ScriptedPrompt {
    fn ask(&self, _question: &str) -> io::Result<Option<String>> {
        Ok(self
            .answers
            .lock()
            .map_or(None, |mut answers| answers.pop_front()))
    }
}

/// Interpret an answer: `Some(true)` for yes, `Some(false)` for no, `None`
/// for anything else.
fn parse_answer(answer: &str) -> Option<bool> {
    match answer.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => Some(true),
        "n" | "no" => Some(false),
        _ => None,
    }
}

/// Latched consent flag plus the prompt used to obtain it.
pub struct AgreementGate {
    given: AtomicBool,
    prompt: Box<dyn Prompt>,
}

impl std::fmt::Debug for AgreementGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgreementGate")
            .field("given", &self.is_open())
            .finish_non_exhaustive()
    }
}

impl AgreementGate {
    /// Create a closed gate that asks through `prompt`.
    #[must_use]
    pub fn new(prompt: Box<dyn Prompt>) -> Self {
        Self {
            given: AtomicBool::new(false),
            prompt,
        }
    }

    /// Whether consent has already been given.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.given.load(Ordering::Acquire)
    }

    /// Ask for consent unless it was already given.
    ///
    /// Unrecognised answers re-prompt; read failures count as a refusal.
    ///
    /// # Errors
    ///
    /// Returns [`AgreementDeclined`] on a negative answer or end of input.
    pub fn ensure(&self) -> Result<(), AgreementDeclined> {
        if self.is_open() {
            return Ok(());
        }
        let mut question = format!("{AGREEMENT_TEXT}\n{AGREEMENT_QUESTION}");
        loop {
            let answer = match self.prompt.ask(&question) {
                Ok(Some(answer)) => answer,
                Ok(None) | Err(_) => return Err(AgreementDeclined),
            };
            match parse_answer(&answer) {
                Some(true) => {
                    self.given.store(true, Ordering::Release);
                    return Ok(());
                }
                Some(false) => return Err(AgreementDeclined),
                None => question = AGREEMENT_QUESTION.to_string(),
            }
        }
    }
}
