//! Best-effort form population
//!
//! Every step is attempted regardless of earlier failures. A failed step is
//! recorded and logged but never aborts the attempt, because the service may
//! fall back to a usable default for that control.

use crate::error::{FieldError, SessionError};
use crate::query::QueryParameters;
use crate::session::{InteractiveSession, Locator, SessionResult};
use tracing::{info, warn};

/// Visible text of the UTC option in the time-type selector
pub const UTC_OPTION: &str = "Coordinated Universal Time (UTC)";

/// Time-type select control
pub const TIME_TYPE_CONTROL: &str = "timeType";

/// Coordinate-frame select control
pub const COORDINATE_CONTROL: &str = "coordinateType";

/// Step name recorded for the model-version radio selection
pub const MODEL_VERSION_STEP: &str = "model_version";

/// Outcome of one form step
#[derive(Debug)]
pub struct StepOutcome {
    pub step: String,
    pub error: Option<FieldError>,
}

/// Per-step record of one population pass
#[derive(Debug, Default)]
pub struct FormReport {
    steps: Vec<StepOutcome>,
}

impl FormReport {
    fn record(&mut self, step: &str, result: SessionResult<()>) {
        let error = match result {
            Ok(()) => None,
            Err(source) => {
                let err = FieldError {
                    step: step.to_string(),
                    source,
                };
                warn!(step, error = %err.source, "Form step failed, continuing");
                Some(err)
            }
        };
        self.steps.push(StepOutcome {
            step: step.to_string(),
            error,
        });
    }

    /// Step names in the order they were attempted
    pub fn attempted(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.step.as_str()).collect()
    }

    /// Steps that failed
    pub fn failures(&self) -> impl Iterator<Item = &FieldError> {
        self.steps.iter().filter_map(|s| s.error.as_ref())
    }

    pub fn all_succeeded(&self) -> bool {
        self.steps.iter().all(|s| s.error.is_none())
    }
}

/// Populate every form control for `params`.
///
/// Order: numeric/date fields, model version, time type, coordinate frame.
pub async fn populate<S>(session: &mut S, params: &QueryParameters) -> FormReport
where
    S: InteractiveSession + ?Sized,
{
    let mut report = FormReport::default();

    for (name, value) in params.form_fields() {
        let result = session.set_field(name, &value).await;
        if result.is_ok() {
            info!("  {} = {}", name, value);
        }
        report.record(name, result);
    }

    let result = select_model_version(session, params).await;
    if result.is_ok() {
        info!("  model = {}", params.model_version);
    }
    report.record(MODEL_VERSION_STEP, result);

    let time_type = Locator::name(TIME_TYPE_CONTROL);
    let result = session.select_option(&time_type, UTC_OPTION).await;
    if result.is_ok() {
        info!("  time type = UTC");
    }
    report.record(TIME_TYPE_CONTROL, result);

    let coordinate = Locator::name(COORDINATE_CONTROL);
    let result = session
        .select_option(&coordinate, params.frame.form_label())
        .await;
    if result.is_ok() {
        info!("  coordinate = {}", params.frame);
    }
    report.record(COORDINATE_CONTROL, result);

    report
}

/// Radio input whose value contains any of the version candidates
pub fn model_version_locator(params: &QueryParameters) -> Locator {
    let predicates: Vec<String> = params
        .model_version_candidates()
        .iter()
        .map(|c| format!("contains(@value, '{}')", c))
        .collect();
    Locator::xpath(format!(
        "//input[@type='radio' and ({})]",
        predicates.join(" or ")
    ))
}

async fn select_model_version<S>(session: &mut S, params: &QueryParameters) -> SessionResult<()>
where
    S: InteractiveSession + ?Sized,
{
    let locator = model_version_locator(params);
    if session.click(&locator).await? {
        Ok(())
    } else {
        Err(SessionError::NoSuchElement(format!(
            "model version radio for '{}'",
            params.model_version
        )))
    }
}
