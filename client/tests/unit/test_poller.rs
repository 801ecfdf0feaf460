//! Remote state poller unit tests

mod support;

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use homeglow::errors::PollErrorKind;
use homeglow::models::light::{LightId, PowerStatus};
use homeglow::sync::mutations::MutationOptions;
use homeglow::workers::poller::{self, Poller};
use support::{Failure, FakeLightService, Harness};

type Seen = Arc<Mutex<Vec<Result<usize, PollErrorKind>>>>;

fn observe(poller: &Poller) -> Seen {
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    poller.on_result(move |result| {
        let entry = result.as_ref().map(|state| state.lights.len()).map_err(|e| e.kind);
        sink.lock().unwrap().push(entry);
    });
    seen
}

fn one_light() -> FakeLightService {
    FakeLightService::with_lights(&[("L1", PowerStatus::Off)])
}

#[tokio::test(start_paused = true)]
async fn test_polls_immediately_then_every_interval() {
    let h = Harness::new(one_light());
    h.sign_in().await;
    let seen = observe(&h.app.poller);

    h.app.poller.start(Duration::from_secs(5));
    assert!(h.app.poller.is_running());
    tokio::time::sleep(Duration::from_secs(11)).await;

    assert_eq!(*seen.lock().unwrap(), vec![Ok(1), Ok(1), Ok(1)]);
    assert_eq!(h.displayed("L1"), Some(PowerStatus::Off));

    h.app.poller.stop();
    assert!(!h.app.poller.is_running());
}

#[tokio::test]
async fn test_no_poll_while_signed_out() {
    let h = Harness::new(one_light());
    let seen = observe(&h.app.poller);

    assert!(!h.app.poller.poll_now().await);
    assert!(seen.lock().unwrap().is_empty());
    assert_eq!(h.service.fetches.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_overlapping_cycle_is_skipped() {
    let h = Harness::new(one_light());
    h.sign_in().await;
    *h.service.read_delay.lock().unwrap() = Some(Duration::from_secs(1));

    let (first, second) = tokio::join!(h.app.poller.poll_now(), h.app.poller.poll_now());

    assert!(first);
    assert!(!second);
    assert_eq!(h.service.fetches.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stop_drops_late_response() {
    let h = Harness::new(one_light());
    h.sign_in().await;
    let seen = observe(&h.app.poller);
    *h.service.read_delay.lock().unwrap() = Some(Duration::from_secs(2));

    tokio::join!(h.app.poller.poll_now(), async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        h.app.poller.stop();
    });

    assert!(seen.lock().unwrap().is_empty());
    assert!(h.app.snapshot().lights.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_poll_now_after_stop_emits_nothing() {
    let h = Harness::new(one_light());
    h.sign_in().await;
    let seen = observe(&h.app.poller);

    h.app.poller.start(Duration::from_secs(60));
    h.app.poller.stop();
    let fetches = h.service.fetches.load(Ordering::SeqCst);
    let revision = h.app.snapshot().revision;

    assert!(!h.app.poller.poll_now().await);

    assert!(seen.lock().unwrap().is_empty());
    assert_eq!(h.service.fetches.load(Ordering::SeqCst), fetches);
    assert_eq!(h.app.snapshot().revision, revision);

    h.app.poller.start(Duration::from_secs(60));
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(h.app.poller.poll_now().await);
    assert_eq!(*seen.lock().unwrap(), vec![Ok(1), Ok(1)]);
    h.app.poller.stop();
}

#[tokio::test]
async fn test_service_failure_is_reported_without_touching_state() {
    let h = Harness::new(one_light());
    h.signed_in_and_polled().await;
    let seen = observe(&h.app.poller);
    *h.service.read_failure.lock().unwrap() = Failure::Remote(500);
    h.service.set_light("L1", PowerStatus::On);

    h.app.poller.poll_now().await;

    assert_eq!(*seen.lock().unwrap(), vec![Err(PollErrorKind::Service)]);
    assert_eq!(h.displayed("L1"), Some(PowerStatus::Off));
    assert!(h.app.session.is_signed_in());
}

#[tokio::test(start_paused = true)]
async fn test_slow_cycle_times_out() {
    let h = Harness::with_options(
        one_light(),
        poller::Options {
            interval: Duration::from_secs(5),
            cycle_timeout: Some(Duration::from_secs(1)),
        },
        MutationOptions::default(),
    );
    h.sign_in().await;
    let seen = observe(&h.app.poller);
    *h.service.read_delay.lock().unwrap() = Some(Duration::from_secs(30));

    h.app.poller.poll_now().await;

    assert_eq!(*seen.lock().unwrap(), vec![Err(PollErrorKind::Timeout)]);
}

#[tokio::test]
async fn test_rejected_poll_refreshes_and_next_poll_succeeds() {
    let h = Harness::new(one_light());
    h.signed_in_and_polled().await;
    h.app.mutations.request_toggle(&LightId::from("L1")).await.unwrap();
    let seen = observe(&h.app.poller);
    h.service.reject_token("token-1");

    h.app.poller.poll_now().await;
    assert_eq!(h.identity.refreshes(), 1);
    assert!(h.is_pending("L1"));

    h.app.poller.poll_now().await;

    assert_eq!(*seen.lock().unwrap(), vec![Err(PollErrorKind::Auth), Ok(1)]);
    assert_eq!(h.identity.refreshes(), 1);
    assert_eq!(h.displayed("L1"), Some(PowerStatus::On));
    assert!(!h.is_pending("L1"));
    assert_eq!(h.service.tokens_seen.lock().unwrap().last().map(String::as_str), Some("token-2"));
}

#[tokio::test]
async fn test_rejected_refresh_signs_out_and_clears_pending() {
    let h = Harness::new(one_light());
    h.signed_in_and_polled().await;
    h.app.mutations.request_toggle(&LightId::from("L1")).await.unwrap();
    let seen = observe(&h.app.poller);
    h.service.reject_token("token-1");
    h.service.reject_token("token-2");

    h.app.poller.poll_now().await;
    h.app.poller.poll_now().await;

    assert_eq!(
        *seen.lock().unwrap(),
        vec![Err(PollErrorKind::Auth), Err(PollErrorKind::Auth)]
    );
    assert_eq!(h.identity.refreshes(), 1);
    assert!(!h.app.session.is_signed_in());

    let snapshot = h.app.snapshot();
    assert!(!snapshot.authenticated);
    assert!(!snapshot.has_pending());
    assert!(snapshot.lights.is_empty());

    assert!(!h.app.poller.poll_now().await);
}

#[tokio::test(start_paused = true)]
async fn test_worker_runs_until_shutdown() {
    let h = Harness::new(one_light());
    h.sign_in().await;
    let seen = observe(&h.app.poller);
    let options = poller::Options {
        interval: Duration::from_secs(5),
        cycle_timeout: None,
    };
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();

    tokio::join!(
        poller::run(
            &options,
            h.app.poller.as_ref(),
            Box::pin(async move {
                let _ = rx.await;
            }),
        ),
        async {
            tokio::time::sleep(Duration::from_secs(6)).await;
            assert!(h.app.poller.is_running());
            let _ = tx.send(());
        }
    );

    assert!(!h.app.poller.is_running());
    assert_eq!(seen.lock().unwrap().len(), 2);
}
