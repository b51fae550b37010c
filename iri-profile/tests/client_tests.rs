//! RemoteModelClient integration tests against a scripted session

mod helpers;

use chrono::{TimeZone, Utc};
use helpers::{settings, Call, Script, ScriptedFactory, SERVICE_URL, SMALL_REPORT};
use iri_profile::client::{ArtifactSource, RESULTS_TAB, SUBMIT_BUTTON};
use iri_profile::session::Locator;
use iri_profile::{ClientError, CoordinateFrame, QueryParameters, RemoteModelClient};
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::Instant;

fn query(dir: &TempDir) -> QueryParameters {
    QueryParameters::new(
        Utc.with_ymd_and_hms(2012, 2, 11, 10, 0, 0).unwrap(),
        135.0,
        35.0,
        dir.path().join("profile.txt"),
    )
}

#[tokio::test(start_paused = true)]
async fn test_submit_fetches_linked_artifact() {
    let dir = TempDir::new().unwrap();
    let (factory, recorder) = ScriptedFactory::new(Script::default());
    let client = RemoteModelClient::new(factory, settings());

    let raw = client
        .submit(query(&dir), Duration::from_secs(60))
        .await
        .unwrap();

    assert_eq!(
        raw.source,
        ArtifactSource::Link(format!("{}output/raw.txt", SERVICE_URL))
    );
    assert_eq!(raw.text, SMALL_REPORT);
    assert_eq!(std::fs::read_to_string(&raw.destination).unwrap(), SMALL_REPORT);
    assert!(raw.form.all_succeeded());
    assert_eq!(recorder.closes(), 1);
    assert!(recorder
        .calls()
        .contains(&Call::Navigate(SERVICE_URL.to_string())));
}

#[tokio::test(start_paused = true)]
async fn test_form_fields_normalized_and_in_order() {
    let dir = TempDir::new().unwrap();
    let (factory, recorder) = ScriptedFactory::new(Script::default());
    let client = RemoteModelClient::new(factory, settings());

    let params = QueryParameters::new(
        Utc.with_ymd_and_hms(2020, 3, 1, 12, 30, 0).unwrap(),
        -30.0,
        95.0,
        dir.path().join("profile.txt"),
    )
    .with_altitude_grid(-10.0, 2500.0, 600.0)
    .with_frame(CoordinateFrame::Geomagnetic);

    client.submit(params, Duration::from_secs(60)).await.unwrap();

    assert_eq!(
        recorder.fields_attempted(),
        ["lat", "lon", "start", "stop", "step", "datetime"]
    );
    assert_eq!(recorder.field_value("lat").unwrap(), "89.900000");
    assert_eq!(recorder.field_value("lon").unwrap(), "330.000000");
    assert_eq!(recorder.field_value("start").unwrap(), "0.0");
    assert_eq!(recorder.field_value("stop").unwrap(), "2000.0");
    assert_eq!(recorder.field_value("step").unwrap(), "500.0");
    assert_eq!(
        recorder.field_value("datetime").unwrap(),
        "2020-03-01T12:30:00"
    );
    assert!(recorder.calls().contains(&Call::Select(
        "[name='coordinateType']".to_string(),
        "Geomagnetic".to_string()
    )));
    assert!(recorder.calls().contains(&Call::Select(
        "[name='timeType']".to_string(),
        "Coordinated Universal Time (UTC)".to_string()
    )));
}

#[tokio::test(start_paused = true)]
async fn test_every_step_attempted_despite_failures() {
    let dir = TempDir::new().unwrap();
    let script = Script {
        failing_fields: vec!["lat".to_string(), "step".to_string()],
        failing_selects: true,
        ..Script::default()
    };
    let (factory, recorder) = ScriptedFactory::new(script);
    let client = RemoteModelClient::new(factory, settings());

    let raw = client
        .submit(query(&dir), Duration::from_secs(60))
        .await
        .unwrap();

    assert_eq!(
        recorder.fields_attempted(),
        ["lat", "lon", "start", "stop", "step", "datetime"]
    );
    assert_eq!(
        raw.form.attempted(),
        [
            "lat",
            "lon",
            "start",
            "stop",
            "step",
            "datetime",
            "model_version",
            "timeType",
            "coordinateType"
        ]
    );
    let failed: Vec<&str> = raw.form.failures().map(|f| f.step.as_str()).collect();
    assert_eq!(failed, ["lat", "step", "timeType", "coordinateType"]);
}

#[tokio::test(start_paused = true)]
async fn test_forced_submit_after_poll_budget() {
    let dir = TempDir::new().unwrap();
    let script = Script {
        validation_checks_with_errors: usize::MAX,
        submit_enabled_after: None,
        ..Script::default()
    };
    let (factory, recorder) = ScriptedFactory::new(script);
    let client = RemoteModelClient::new(factory, settings());

    let start = Instant::now();
    client
        .submit(query(&dir), Duration::from_secs(60))
        .await
        .unwrap();

    assert_eq!(recorder.count(|c| matches!(c, Call::DispatchSubmit)), 1);
    assert!(!recorder
        .calls()
        .contains(&Call::Click(Locator::css(SUBMIT_BUTTON))));
    // 10 × 500 ms validation + 30 × 1 s submit + 2 s reveal settle
    assert_eq!(start.elapsed(), Duration::from_secs(37));
}

#[tokio::test(start_paused = true)]
async fn test_submit_clicked_once_enabled() {
    let dir = TempDir::new().unwrap();
    let script = Script {
        submit_enabled_after: Some(3),
        ..Script::default()
    };
    let (factory, recorder) = ScriptedFactory::new(script);
    let client = RemoteModelClient::new(factory, settings());

    client
        .submit(query(&dir), Duration::from_secs(60))
        .await
        .unwrap();

    assert_eq!(
        recorder.count(|c| *c == Call::Click(Locator::css(SUBMIT_BUTTON))),
        1
    );
    assert_eq!(recorder.count(|c| matches!(c, Call::DispatchSubmit)), 0);
    assert!(recorder
        .calls()
        .contains(&Call::Click(Locator::xpath(RESULTS_TAB))));
}

#[tokio::test(start_paused = true)]
async fn test_inline_text_used_without_link() {
    let dir = TempDir::new().unwrap();
    let script = Script {
        link: None,
        inline_text: Some(SMALL_REPORT.to_string()),
        ..Script::default()
    };
    let (factory, recorder) = ScriptedFactory::new(script);
    let client = RemoteModelClient::new(factory, settings());

    let raw = client
        .submit(query(&dir), Duration::from_secs(60))
        .await
        .unwrap();

    assert_eq!(raw.source, ArtifactSource::Inline);
    assert_eq!(recorder.count(|c| matches!(c, Call::Fetch(_))), 0);
}

#[tokio::test(start_paused = true)]
async fn test_short_inline_text_is_failure() {
    let dir = TempDir::new().unwrap();
    let script = Script {
        link: None,
        inline_text: Some("   Error: model unavailable   ".to_string()),
        ..Script::default()
    };
    let (factory, recorder) = ScriptedFactory::new(script);
    let client = RemoteModelClient::new(factory, settings());

    let err = client
        .submit(query(&dir), Duration::from_secs(60))
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::NoContent));
    assert_eq!(recorder.closes(), 1);
    assert!(!dir.path().join("profile.txt").exists());
}

#[tokio::test(start_paused = true)]
async fn test_result_timeout_closes_session() {
    let dir = TempDir::new().unwrap();
    let script = Script {
        result_ready: false,
        ..Script::default()
    };
    let (factory, recorder) = ScriptedFactory::new(script);
    let client = RemoteModelClient::new(factory, settings());

    let err = client
        .submit(query(&dir), Duration::from_secs(60))
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::ResultTimeout(d) if d == Duration::from_secs(60)));
    assert_eq!(recorder.closes(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_panicking_session_becomes_failure() {
    let dir = TempDir::new().unwrap();
    let script = Script {
        panic_on_navigate: true,
        ..Script::default()
    };
    let (factory, recorder) = ScriptedFactory::new(script);
    let client = RemoteModelClient::new(factory, settings());

    let err = client
        .submit(query(&dir), Duration::from_secs(60))
        .await
        .unwrap_err();

    match err {
        ClientError::Panicked(msg) => assert_eq!(msg, "browser process crashed"),
        other => panic!("expected Panicked, got {:?}", other),
    }
    assert_eq!(recorder.closes(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_run_retries_with_linear_backoff() {
    let dir = TempDir::new().unwrap();
    let script = Script {
        always_fail: true,
        ..Script::default()
    };
    let (factory, recorder) = ScriptedFactory::new(script);
    let client = RemoteModelClient::new(factory, settings());

    let start = Instant::now();
    let err = client.run(query(&dir), 3).await.unwrap_err();

    assert!(matches!(err, ClientError::RetriesExhausted { attempts: 3 }));
    let opens: Vec<Duration> = recorder
        .opens()
        .into_iter()
        .map(|at| at - start)
        .collect();
    assert_eq!(
        opens,
        [
            Duration::ZERO,
            Duration::from_secs(5),
            Duration::from_secs(15)
        ]
    );
    // No sleep after the final attempt
    assert_eq!(start.elapsed(), Duration::from_secs(15));
    assert_eq!(recorder.closes(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_run_opens_each_attempt_with_doubled_timeout() {
    let dir = TempDir::new().unwrap();
    let script = Script {
        always_fail: true,
        ..Script::default()
    };
    let (factory, recorder) = ScriptedFactory::new(script);
    let client = RemoteModelClient::new(factory, settings());

    client.run(query(&dir), 3).await.unwrap_err();

    assert_eq!(settings().timeout, Duration::from_secs(30));
    assert_eq!(recorder.open_timeouts(), [Duration::from_secs(60); 3]);
}

#[tokio::test(start_paused = true)]
async fn test_panicking_factory_becomes_failure() {
    let dir = TempDir::new().unwrap();
    let script = Script {
        panic_on_open: true,
        ..Script::default()
    };
    let (factory, recorder) = ScriptedFactory::new(script);
    let client = RemoteModelClient::new(factory, settings());

    let err = client
        .submit(query(&dir), Duration::from_secs(60))
        .await
        .unwrap_err();

    match err {
        ClientError::Panicked(msg) => assert_eq!(msg, "driver binary missing"),
        other => panic!("expected Panicked, got {:?}", other),
    }
    // No session was handed out, so there is nothing to close
    assert_eq!(recorder.opens().len(), 1);
    assert_eq!(recorder.closes(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_run_succeeds_after_transient_failure() {
    let dir = TempDir::new().unwrap();
    let script = Script {
        failing_attempts: 1,
        ..Script::default()
    };
    let (factory, recorder) = ScriptedFactory::new(script);
    let client = RemoteModelClient::new(factory, settings());

    let raw = client.run(query(&dir), 3).await.unwrap();

    assert_eq!(raw.text, SMALL_REPORT);
    assert_eq!(recorder.opens().len(), 2);
    assert_eq!(recorder.closes(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_run_rejects_non_finite_query_without_session() {
    let dir = TempDir::new().unwrap();
    let (factory, recorder) = ScriptedFactory::new(Script::default());
    let client = RemoteModelClient::new(factory, settings());

    let params = QueryParameters::new(
        Utc.with_ymd_and_hms(2012, 2, 11, 10, 0, 0).unwrap(),
        f64::NAN,
        35.0,
        dir.path().join("profile.txt"),
    );
    let err = client.run(params, 3).await.unwrap_err();

    assert!(matches!(err, ClientError::InvalidQuery(_)));
    assert!(recorder.calls().is_empty());
}
