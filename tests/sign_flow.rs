mod common;

use accumulate_web3::config;
use accumulate_web3::protocol::{DataEntry, Transaction};
use accumulate_web3::sign::{Failure, Flow, Line, Phase, Progress, Request, WaitOutcome};
use accumulate_web3::{Account, Error, Mounted, SignTransaction, Url};
use common::{MockApi, MockProvider, Outcome};
use std::sync::Arc;

struct Fixture {
    api: Arc<MockApi>,
    provider: Arc<MockProvider>,
    progress: Arc<Progress>,
    flow: Flow,
}

fn fixture(mounted: Mounted) -> Fixture {
    fixture_with(mounted, 60)
}

fn fixture_with(mounted: Mounted, attempts: u32) -> Fixture {
    let api = MockApi::new();
    let provider = MockProvider::new(7);
    let driver = common::driver(&provider);
    let account = Arc::new(Account::new(provider.public_key(), driver.clone(), common::shared()));
    let progress = Arc::new(Progress::new(mounted));
    let flow = Flow::with_config(
        api.clone(),
        driver,
        account,
        progress.clone(),
        &config::Sign {
            poll_interval_ms: 500,
            poll_attempts: attempts,
        },
    );
    Fixture {
        api,
        provider,
        progress,
        flow,
    }
}

fn write() -> Transaction {
    let url = Url::parse("acc://alice.acme/data").unwrap();
    Transaction::write_data(url, DataEntry::double_hash(vec![b"hello".to_vec()]))
}

#[tokio::test(start_paused = true)]
async fn nested_transactions_are_all_delivered() {
    let f = fixture(Mounted::new());
    f.api.plan(vec![Outcome::Delivered, Outcome::Delivered, Outcome::Delivered]);
    let (request, completion) = Request::new(write(), None);

    let report = f.flow.run(&request).await.unwrap();
    assert_eq!(report.phase, Phase::Done);
    assert_eq!(report.transactions.len(), 3);
    assert!(report.transactions.iter().all(WaitOutcome::is_done));
    assert_eq!(f.flow.phase(), Phase::Done);
    assert!(completion.wait().await);
}

#[tokio::test(start_paused = true)]
async fn undelivered_middle_transaction_times_out() {
    let f = fixture(Mounted::new());
    f.api.plan(vec![Outcome::Delivered, Outcome::Pending, Outcome::Delivered]);
    let (request, completion) = Request::new(write(), None);

    let report = f.flow.run(&request).await.unwrap();
    assert_eq!(report.transactions.len(), 2);
    let (first, produced) = match &report.transactions[0] {
        WaitOutcome::Delivered { id, produced } => (id.clone(), produced.clone()),
        other => panic!("first transaction was not delivered: {:?}", other),
    };
    assert_eq!(first.account(), &Url::parse("acc://alice.acme/data").unwrap());
    assert_eq!(
        report.transactions[1],
        WaitOutcome::Timeout {
            id: produced[0].clone()
        }
    );
    assert_eq!(
        report.phase,
        Phase::Failed(Failure::Timeout {
            id: produced[0].clone()
        })
    );
    assert!(!completion.wait().await);
}

#[tokio::test(start_paused = true)]
async fn failed_transaction_is_reported() {
    let f = fixture(Mounted::new());
    f.api.plan(vec![Outcome::Failed("insufficient credits")]);
    let (request, _) = Request::new(write(), None);

    let report = f.flow.run(&request).await.unwrap();
    match report.phase {
        Phase::Failed(Failure::Transaction { message, .. }) => assert_eq!(message, "insufficient credits"),
        other => panic!("unexpected phase {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn requests_are_submitted_at_most_once() {
    let f = fixture(Mounted::new());
    let (request, _) = Request::new(write(), None);

    assert!(f.flow.run(&request).await.unwrap().is_done());
    assert!(f.flow.run(&request).await.is_none());
    assert_eq!(f.api.submits(), 1);
    assert_eq!(f.provider.calls("eth_sign"), 1);
}

#[tokio::test(start_paused = true)]
async fn cancelled_requests_are_not_signed() {
    let f = fixture(Mounted::new());
    let (request, completion) = Request::new(write(), None);
    request.cancel();
    assert!(!completion.wait().await);

    let report = f.flow.run(&request).await.unwrap();
    assert_eq!(report.phase, Phase::Failed(Failure::Cancelled));
    assert_eq!(f.provider.calls("eth_sign"), 0);
    assert_eq!(f.api.submits(), 0);
}

#[tokio::test(start_paused = true)]
async fn user_rejection_stops_before_submission() {
    let f = fixture(Mounted::new());
    f.provider.reject_all(true);
    let (request, completion) = Request::new(write(), None);

    let report = f.flow.run(&request).await.unwrap();
    assert_eq!(report.phase, Phase::Failed(Failure::Rejected));
    assert_eq!(f.api.submits(), 0);
    assert!(!completion.wait().await);
    assert!(matches!(f.progress.lines().last(), Some(Line::Failure(_))));
}

#[tokio::test(start_paused = true)]
async fn rejected_submission_reports_the_message() {
    let f = fixture(Mounted::new());
    f.api.reject_next("signature is invalid");
    let (request, _) = Request::new(write(), None);

    let report = f.flow.run(&request).await.unwrap();
    assert_eq!(
        report.phase,
        Phase::Failed(Failure::Submission("signature is invalid".to_string()))
    );
}

#[tokio::test(start_paused = true)]
async fn progress_lists_each_step() {
    let f = fixture(Mounted::new());
    let mut updates = f.progress.subscribe();
    let (request, _) = Request::new(write(), None);

    f.flow.run(&request).await.unwrap();
    let lines = f.progress.lines();
    assert_eq!(lines[0], Line::Success("Signed".to_string()));
    assert_eq!(lines[1], Line::Success("Submitted".to_string()));
    assert!(matches!(lines[2], Line::Success(_)));
    assert!(updates.has_changed().unwrap());
    assert_eq!(*updates.borrow_and_update(), lines);
}

#[tokio::test(start_paused = true)]
async fn unmounted_progress_stays_silent() {
    let mounted = Mounted::new();
    let f = fixture(mounted.clone());
    mounted.unmount();
    let (request, completion) = Request::new(write(), None);

    assert!(f.flow.run(&request).await.unwrap().is_done());
    assert!(f.progress.lines().is_empty());
    assert!(completion.wait().await);
}

#[tokio::test(start_paused = true)]
async fn cancelling_while_signing_stops_before_submission() {
    let f = fixture(Mounted::new());
    let (request, completion) = Request::new(write(), None);
    let pending = request.clone();
    f.provider.on_sign(move || pending.cancel());

    let report = f.flow.run(&request).await.unwrap();
    assert_eq!(report.phase, Phase::Failed(Failure::Cancelled));
    assert_eq!(f.provider.calls("eth_sign"), 1);
    assert_eq!(f.api.submits(), 0);
    assert!(!completion.wait().await);
}

#[tokio::test(start_paused = true)]
async fn declining_is_an_error_and_other_failures_are_not() {
    let f = fixture(Mounted::new());
    f.provider.reject_all(true);
    assert!(matches!(f.flow.sign(write()).await, Err(Error::UserRejected)));

    f.provider.reject_all(false);
    f.api.reject_next("signature is invalid");
    assert!(matches!(f.flow.sign(write()).await, Ok(false)));
    assert!(matches!(f.flow.sign(write()).await, Ok(true)));
}

#[tokio::test(start_paused = true)]
async fn every_transaction_gets_its_own_attempts() {
    let f = fixture_with(Mounted::new(), 5);
    // Each path needs nine polls in total, each transaction at most four.
    f.api.plan(vec![
        Outcome::DeliveredAfter(3),
        Outcome::Branches(vec![Outcome::DeliveredAfter(3), Outcome::DeliveredAfter(3)]),
    ]);
    let (request, _) = Request::new(write(), None);

    let report = f.flow.run(&request).await.unwrap();
    assert_eq!(report.phase, Phase::Done);
    assert_eq!(report.transactions.len(), 4);
    assert!(report.transactions.iter().all(WaitOutcome::is_done));
}

#[tokio::test(start_paused = true)]
async fn a_slow_sibling_times_out_alone() {
    let f = fixture_with(Mounted::new(), 5);
    f.api.plan(vec![
        Outcome::Branches(vec![Outcome::DeliveredAfter(4), Outcome::DeliveredAfter(5)]),
    ]);
    let (request, _) = Request::new(write(), None);

    let report = f.flow.run(&request).await.unwrap();
    assert!(matches!(report.phase, Phase::Failed(Failure::Timeout { .. })));
    let delivered = report.transactions.iter().filter(|t| t.is_done()).count();
    let timed_out: Vec<_> = report
        .transactions
        .iter()
        .filter(|t| matches!(t, WaitOutcome::Timeout { .. }))
        .collect();
    assert_eq!(delivered, 2);
    assert_eq!(timed_out.len(), 1);
}
