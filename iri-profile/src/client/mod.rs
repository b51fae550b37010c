//! Remote model client
//!
//! Drives one remote computation request to completion through an
//! [`InteractiveSession`] and returns the raw result text.
//!
//! # Attempt sequence
//! 1. Normalize the query (longitude wrap, latitude/altitude/step clamps)
//! 2. Open a session and wait for the form page (bounded by the attempt timeout)
//! 3. Populate every form control, best effort ([`form::populate`])
//! 4. Poll for the validation-error indicator to clear (10 × 500 ms, then proceed anyway)
//! 5. Poll for the submit control to enable (30 × 1 s); click it, or force a
//!    submit event once the budget is spent
//! 6. Wait up to 60 s for a result indicator
//! 7. Reveal the results view, then resolve the artifact ([`artifact::resolve`])
//! 8. Write the text to the query's destination
//!
//! The session is closed after every attempt, whatever the outcome. Faults
//! inside an attempt (including panics in the session backend) become a
//! retryable [`ClientError`]; [`RemoteModelClient::run`] retries them with a
//! linear backoff.

pub mod artifact;
pub mod form;

use crate::error::ClientError;
use crate::query::QueryParameters;
use crate::session::{BoundedPoll, InteractiveSession, Locator, SessionFactory};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn, Instrument};
use uuid::Uuid;

pub use artifact::ArtifactSource;
pub use form::FormReport;

/// Validation-error indicator rendered next to invalid inputs
pub const VALIDATION_ERROR_CLASS: &str = "common_errorText__MGmlx";

/// Submit control
pub const SUBMIT_BUTTON: &str = "button[type='submit']";

/// Links that appear once a computation has finished
pub const RESULT_INDICATOR: &str =
    "//a[contains(., 'Raw Output') or contains(., 'Results') or contains(., 'Download')]";

/// Secondary control revealing the results view
pub const RESULTS_TAB: &str = "//*[self::button or self::a][contains(translate(., 'ABCDEFGHIJKLMNOPQRSTUVWXYZ', 'abcdefghijklmnopqrstuvwxyz'), 'results') or contains(translate(., 'ABCDEFGHIJKLMNOPQRSTUVWXYZ', 'abcdefghijklmnopqrstuvwxyz'), 'output')]";

/// Client tuning
///
/// Defaults mirror the remote service's observed behaviour: computation
/// takes tens of seconds and the submit control enables only after
/// client-side validation settles.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    /// Form URL
    pub base_url: String,
    /// Caller-specified timeout; each attempt gets twice this
    pub timeout: Duration,
    pub validation_polls: u32,
    pub validation_interval: Duration,
    pub submit_polls: u32,
    pub submit_interval: Duration,
    /// Single bounded wait for the result indicator
    pub result_wait: Duration,
    pub result_poll_interval: Duration,
    /// Settling time after revealing the results view
    pub reveal_settle: Duration,
    pub fetch_timeout: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            base_url: "https://kauai.ccmc.gsfc.nasa.gov/instantrun/iri/".to_string(),
            timeout: Duration::from_secs(30),
            validation_polls: 10,
            validation_interval: Duration::from_millis(500),
            submit_polls: 30,
            submit_interval: Duration::from_secs(1),
            result_wait: Duration::from_secs(60),
            result_poll_interval: Duration::from_millis(500),
            reveal_settle: Duration::from_secs(2),
            fetch_timeout: Duration::from_secs(60),
        }
    }
}

/// Raw service output for one successful attempt
#[derive(Debug)]
pub struct RawResult {
    /// Text file the output was written to
    pub destination: PathBuf,
    /// Output text exactly as served
    pub text: String,
    pub source: ArtifactSource,
    /// Per-step form population record
    pub form: FormReport,
    /// Correlates this attempt's log lines
    pub request_id: Uuid,
}

/// How the form was submitted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitPath {
    /// Submit control clicked after this many polls
    Clicked { polls: u32 },
    /// Control never enabled; submit event dispatched directly
    Forced,
}

/// Linear backoff before retry `attempt + 1`: 5 s × attempt
pub fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(5 * attempt as u64)
}

/// Remote model client over a session factory
pub struct RemoteModelClient<F> {
    factory: F,
    settings: ClientSettings,
}

impl<F: SessionFactory> RemoteModelClient<F> {
    pub fn new(factory: F, settings: ClientSettings) -> Self {
        Self { factory, settings }
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    /// Run one attempt.
    ///
    /// Never panics and never leaves a session open: the session acquired here
    /// is closed before returning on every path.
    pub async fn submit(
        &self,
        params: QueryParameters,
        timeout: Duration,
    ) -> Result<RawResult, ClientError> {
        let params = params.normalized()?;
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!("submit", %request_id);

        async move {
            info!("--- Requesting IRI profile ---");
            let mut session = match AssertUnwindSafe(self.factory.open(timeout))
                .catch_unwind()
                .await
            {
                Ok(opened) => opened?,
                Err(panic) => return Err(ClientError::Panicked(panic_message(panic))),
            };

            let outcome = AssertUnwindSafe(self.drive(&mut session, &params, timeout))
                .catch_unwind()
                .await;

            if let Err(e) = session.close().await {
                warn!(error = %e, "Session close failed");
            }

            let (text, source, form) = match outcome {
                Ok(result) => result?,
                Err(panic) => return Err(ClientError::Panicked(panic_message(panic))),
            };

            tokio::fs::write(&params.destination, &text).await?;
            info!("Success: saved to '{}'", params.destination.display());

            Ok(RawResult {
                destination: params.destination.clone(),
                text,
                source,
                form,
                request_id,
            })
        }
        .instrument(span)
        .await
    }

    /// Retry wrapper around [`submit`](Self::submit).
    ///
    /// Makes up to `max_retries` attempts, each with twice the configured
    /// timeout, sleeping `5 s × attempt` between attempts. Exhaustion is
    /// reported as [`ClientError::RetriesExhausted`] so a caller iterating
    /// many queries can skip this one and continue.
    pub async fn run(
        &self,
        params: QueryParameters,
        max_retries: u32,
    ) -> Result<RawResult, ClientError> {
        let params = params.normalized()?;
        let attempt_timeout = self.settings.timeout * 2;

        for attempt in 1..=max_retries {
            if attempt > 1 {
                info!("RETRY ATTEMPT: {} / {}", attempt, max_retries);
            }

            match self.submit(params.clone(), attempt_timeout).await {
                Ok(raw) => return Ok(raw),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => warn!(attempt, max_retries, error = %e, "Attempt failed"),
            }

            if attempt < max_retries {
                let wait = backoff_delay(attempt);
                info!("Waiting {}s before next attempt...", wait.as_secs());
                tokio::time::sleep(wait).await;
            }
        }

        error!(
            "Failed to retrieve IRI profile after {} attempts",
            max_retries
        );
        Err(ClientError::RetriesExhausted {
            attempts: max_retries,
        })
    }

    async fn drive(
        &self,
        session: &mut F::Session,
        params: &QueryParameters,
        timeout: Duration,
    ) -> Result<(String, ArtifactSource, FormReport), ClientError> {
        let settings = &self.settings;

        match tokio::time::timeout(timeout, session.navigate(&settings.base_url)).await {
            Ok(result) => result?,
            Err(_) => return Err(ClientError::NavigationTimeout(timeout)),
        }

        info!("--- inputting parameters ---");
        let form = form::populate(session, params).await;

        if self.await_validation(session).await {
            info!("All input parameters are valid");
        } else {
            warn!("Validation indicator still present, submitting anyway");
        }

        match self.submit_form(session).await? {
            SubmitPath::Clicked { polls } => {
                info!("Submit button enabled (after {}s). Clicked", polls)
            }
            SubmitPath::Forced => warn!("Submit button timeout. Forced submit event"),
        }

        info!("Form submitted. Waiting for results...");
        let indicator = Locator::xpath(RESULT_INDICATOR);
        let appeared = session
            .wait_for(&indicator, settings.result_wait, settings.result_poll_interval)
            .await?;
        if !appeared {
            return Err(ClientError::ResultTimeout(settings.result_wait));
        }

        match session.click(&Locator::xpath(RESULTS_TAB)).await {
            Ok(true) => {}
            Ok(false) => info!("No separate results view"),
            Err(e) => warn!(error = %e, "Could not reveal results view"),
        }
        tokio::time::sleep(settings.reveal_settle).await;

        let (text, source) =
            artifact::resolve(session, &settings.base_url, settings.fetch_timeout).await?;
        Ok((text, source, form))
    }

    /// Poll for the validation-error indicator to disappear.
    ///
    /// `false` means the budget ran out with errors still showing.
    async fn await_validation(&self, session: &mut F::Session) -> bool {
        let indicator = Locator::Class(VALIDATION_ERROR_CLASS.to_string());
        let mut poll = BoundedPoll::new(
            self.settings.validation_polls,
            self.settings.validation_interval,
        );
        loop {
            if matches!(session.count(&indicator).await, Ok(0)) {
                return true;
            }
            if !poll.wait().await {
                return false;
            }
        }
    }

    /// Click the submit control once enabled, or force a submit event
    async fn submit_form(&self, session: &mut F::Session) -> Result<SubmitPath, ClientError> {
        info!("--- Monitoring Submit Button ---");
        let button = Locator::css(SUBMIT_BUTTON);
        let mut poll = BoundedPoll::new(self.settings.submit_polls, self.settings.submit_interval);

        loop {
            if matches!(session.is_enabled(&button).await, Ok(true))
                && matches!(session.click(&button).await, Ok(true))
            {
                return Ok(SubmitPath::Clicked { polls: poll.used() });
            }
            if !poll.wait().await {
                break;
            }
        }

        session.dispatch_submit(&Locator::css("form")).await?;
        Ok(SubmitPath::Forced)
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
