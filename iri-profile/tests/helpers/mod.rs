//! Shared test helpers: an in-memory scripted session and a recording factory

#![allow(dead_code)]

use async_trait::async_trait;
use iri_profile::client::{RESULT_INDICATOR, SUBMIT_BUTTON, VALIDATION_ERROR_CLASS};
use iri_profile::session::{InteractiveSession, Locator, SessionFactory, SessionResult};
use iri_profile::{ClientSettings, SessionError};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

pub const SERVICE_URL: &str = "https://model.test/instantrun/iri/";

/// Five-row report, 100 to 500 km
pub const SMALL_REPORT: &str = include_str!("../fixtures/iri_profile.txt");

/// Everything a session was asked to do
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Open { at: Instant, timeout: Duration },
    Navigate(String),
    SetField(String, String),
    Select(String, String),
    Click(Locator),
    DispatchSubmit,
    Fetch(String),
    Close,
}

/// Session behaviour
#[derive(Debug, Clone)]
pub struct Script {
    /// Leading attempts whose navigation fails
    pub failing_attempts: usize,
    /// Every navigation fails
    pub always_fail: bool,
    /// Opening a session panics
    pub panic_on_open: bool,
    /// Navigation panics
    pub panic_on_navigate: bool,
    /// `set_field` fails for these names
    pub failing_fields: Vec<String>,
    /// `select_option` always fails
    pub failing_selects: bool,
    /// Validation indicator checks that still report errors
    pub validation_checks_with_errors: usize,
    /// Enablement checks before the submit control enables; `None` never enables
    pub submit_enabled_after: Option<usize>,
    /// Result indicator appears
    pub result_ready: bool,
    pub link: Option<String>,
    pub fetched_text: String,
    pub inline_text: Option<String>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            failing_attempts: 0,
            always_fail: false,
            panic_on_open: false,
            panic_on_navigate: false,
            failing_fields: Vec::new(),
            failing_selects: false,
            validation_checks_with_errors: 0,
            submit_enabled_after: Some(0),
            result_ready: true,
            link: Some("output/raw.txt".to_string()),
            fetched_text: SMALL_REPORT.to_string(),
            inline_text: None,
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    opened: usize,
    validation_checks: usize,
    enabled_checks: usize,
}

/// Call log shared by a factory and every session it opened
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    calls: Arc<Mutex<Vec<Call>>>,
}

impl Recorder {
    fn push(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn opens(&self) -> Vec<Instant> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Open { at, .. } => Some(at),
                _ => None,
            })
            .collect()
    }

    /// Page-load timeout each session was opened with
    pub fn open_timeouts(&self) -> Vec<Duration> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Open { timeout, .. } => Some(timeout),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, wanted: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| wanted(c)).count()
    }

    pub fn closes(&self) -> usize {
        self.count(|c| matches!(c, Call::Close))
    }

    /// Field names in the order they were set, across all sessions
    pub fn fields_attempted(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::SetField(name, _) => Some(name),
                _ => None,
            })
            .collect()
    }

    pub fn field_value(&self, field: &str) -> Option<String> {
        self.calls().into_iter().find_map(|c| match c {
            Call::SetField(name, value) if name == field => Some(value),
            _ => None,
        })
    }
}

pub struct ScriptedFactory {
    script: Script,
    recorder: Recorder,
    counters: Arc<Mutex<Counters>>,
}

impl ScriptedFactory {
    pub fn new(script: Script) -> (Self, Recorder) {
        let recorder = Recorder::default();
        (
            Self {
                script,
                recorder: recorder.clone(),
                counters: Arc::new(Mutex::new(Counters::default())),
            },
            recorder,
        )
    }
}

#[async_trait]
impl SessionFactory for ScriptedFactory {
    type Session = ScriptedSession;

    async fn open(&self, page_load_timeout: Duration) -> SessionResult<ScriptedSession> {
        self.recorder.push(Call::Open {
            at: Instant::now(),
            timeout: page_load_timeout,
        });
        if self.script.panic_on_open {
            panic!("driver binary missing");
        }
        let attempt = {
            let mut counters = self.counters.lock().unwrap();
            counters.opened += 1;
            counters.opened
        };
        Ok(ScriptedSession {
            script: self.script.clone(),
            recorder: self.recorder.clone(),
            counters: self.counters.clone(),
            attempt,
        })
    }
}

pub struct ScriptedSession {
    script: Script,
    recorder: Recorder,
    counters: Arc<Mutex<Counters>>,
    attempt: usize,
}

#[async_trait]
impl InteractiveSession for ScriptedSession {
    async fn navigate(&mut self, url: &str) -> SessionResult<()> {
        self.recorder.push(Call::Navigate(url.to_string()));
        if self.script.panic_on_navigate {
            panic!("browser process crashed");
        }
        if self.script.always_fail || self.attempt <= self.script.failing_attempts {
            return Err(SessionError::Transport("connection refused".to_string()));
        }
        Ok(())
    }

    async fn set_field(&mut self, name: &str, value: &str) -> SessionResult<()> {
        self.recorder
            .push(Call::SetField(name.to_string(), value.to_string()));
        if self.script.failing_fields.iter().any(|f| f == name) {
            return Err(SessionError::NoSuchElement(name.to_string()));
        }
        Ok(())
    }

    async fn select_option(&mut self, target: &Locator, visible_text: &str) -> SessionResult<()> {
        self.recorder
            .push(Call::Select(target.to_string(), visible_text.to_string()));
        if self.script.failing_selects {
            return Err(SessionError::NoSuchElement(target.to_string()));
        }
        Ok(())
    }

    async fn click(&mut self, target: &Locator) -> SessionResult<bool> {
        self.recorder.push(Call::Click(target.clone()));
        Ok(true)
    }

    async fn dispatch_submit(&mut self, _target: &Locator) -> SessionResult<()> {
        self.recorder.push(Call::DispatchSubmit);
        Ok(())
    }

    async fn count(&mut self, target: &Locator) -> SessionResult<usize> {
        match target {
            Locator::Class(class) if class == VALIDATION_ERROR_CLASS => {
                let mut counters = self.counters.lock().unwrap();
                counters.validation_checks += 1;
                if counters.validation_checks <= self.script.validation_checks_with_errors {
                    Ok(1)
                } else {
                    Ok(0)
                }
            }
            Locator::XPath(expr) if expr == RESULT_INDICATOR => {
                Ok(usize::from(self.script.result_ready))
            }
            _ => Ok(1),
        }
    }

    async fn is_enabled(&mut self, target: &Locator) -> SessionResult<bool> {
        if *target != Locator::css(SUBMIT_BUTTON) {
            return Ok(true);
        }
        let mut counters = self.counters.lock().unwrap();
        let checks = counters.enabled_checks;
        counters.enabled_checks += 1;
        Ok(self
            .script
            .submit_enabled_after
            .map_or(false, |after| checks >= after))
    }

    async fn rendered_text(&mut self, _target: &Locator) -> SessionResult<Option<String>> {
        Ok(self.script.inline_text.clone())
    }

    async fn link_href(&mut self, _labels: &[&str]) -> SessionResult<Option<String>> {
        Ok(self.script.link.clone())
    }

    async fn fetch(&mut self, url: &str, _timeout: Duration) -> SessionResult<String> {
        self.recorder.push(Call::Fetch(url.to_string()));
        Ok(self.script.fetched_text.clone())
    }

    async fn close(&mut self) -> SessionResult<()> {
        self.recorder.push(Call::Close);
        Ok(())
    }
}

pub fn settings() -> ClientSettings {
    ClientSettings {
        base_url: SERVICE_URL.to_string(),
        ..ClientSettings::default()
    }
}
