use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_stream::StreamExt;

use flightdeck_core::{PlanHasher, QueryId};
use flightdeck_server::{ControlMessage, Progress, QueryOptions, ServiceError};
use flightdeck_storage::MemoryBackend;

use crate::helpers::*;

fn ticket_of(messages: &[ControlMessage]) -> QueryId {
    match messages.last() {
        Some(ControlMessage::Ticket(id)) => *id,
        other => panic!("expected a terminal ticket, got {other:?}"),
    }
}

#[tokio::test]
async fn select_all_streams_progress_then_ticket() {
    let state = app_state(Arc::new(select_all_backend()));

    let messages = submit(&state, "select-all").await;
    assert_eq!(
        messages,
        vec![
            ControlMessage::Progress(Progress::Received),
            ControlMessage::Progress(Progress::Executed),
            ControlMessage::Ticket(PlanHasher::hash_bytes(b"select-all")),
        ]
    );

    let stream = state.data.fetch(&ticket_of(&messages).to_ticket()).unwrap();
    assert_eq!(stream.schema(), id_schema());
    let batches: Vec<_> = stream.collect();
    assert_eq!(id_values(&batches), vec![0, 1, 2]);
}

#[tokio::test]
async fn fetch_reproduces_batches_in_order_on_every_call() {
    let backend = ScriptedBackend::new()
        .with_table("t", vec![ids(0, 2), ids(10, 1), ids(20, 3)])
        .with_plan(b"scan t", "t");
    let state = app_state(Arc::new(backend));

    let ticket = ticket_of(&submit(&state, "scan t").await).to_ticket();
    for _ in 0..3 {
        let batches: Vec<_> = state.data.fetch(&ticket).unwrap().collect();
        assert_eq!(batches.len(), 3);
        assert_eq!(id_values(&batches), vec![0, 1, 10, 20, 21, 22]);
        assert!(batches.iter().all(|b| b.schema() == id_schema()));
    }
}

#[tokio::test]
async fn resubmitting_a_plan_reuses_the_cached_result() {
    let backend = Arc::new(select_all_backend());
    let state = app_state(backend.clone());

    let first = submit(&state, "select-all").await;
    let second = submit(&state, "select-all").await;

    assert_eq!(ticket_of(&first), ticket_of(&second));
    assert_eq!(second[1], ControlMessage::Progress(Progress::Cached));
    assert_eq!(backend.executions(), 1);
    assert_eq!(state.queries.cache().len(), 1);
}

#[tokio::test]
async fn zero_length_plan_gets_exactly_one_terminal_message() {
    let backend = Arc::new(select_all_backend());
    let state = app_state(backend.clone());

    let messages = submit(&state, "").await;
    let terminals = messages.iter().filter(|m| m.is_terminal()).count();
    assert_eq!(terminals, 1);
    assert!(messages.last().is_some_and(|m| m.is_terminal()));
    assert!(matches!(messages.last(), Some(ControlMessage::Error(d)) if d == "empty plan"));
    assert!(state.queries.cache().is_empty());
}

#[tokio::test]
async fn failed_plan_leaves_no_ticket_behind() {
    let state = app_state(Arc::new(select_all_backend()));

    let messages = submit(&state, "drop everything").await;
    assert_eq!(messages[0], ControlMessage::Progress(Progress::Received));
    assert!(matches!(&messages[1], ControlMessage::Error(d) if d.contains("unsupported plan")));
    assert_eq!(messages.len(), 2);

    let id = PlanHasher::hash_bytes(b"drop everything");
    assert!(matches!(
        state.data.fetch(&id.to_ticket()),
        Err(ServiceError::InvalidTicket(_))
    ));
}

#[tokio::test]
async fn never_issued_ticket_is_invalid() {
    let state = app_state(Arc::new(select_all_backend()));
    let ticket = PlanHasher::hash_bytes(b"never submitted").to_ticket();

    assert!(matches!(
        state.data.fetch(&ticket),
        Err(ServiceError::InvalidTicket(_))
    ));
}

#[tokio::test]
async fn concurrent_submissions_keep_results_apart() {
    let backend = ScriptedBackend::new()
        .with_table("low", vec![ids(0, 5)])
        .with_table("high", vec![ids(1000, 7)])
        .with_plan(b"low", "low")
        .with_plan(b"high", "high")
        .with_delay(Duration::from_millis(20));
    let state = app_state(Arc::new(backend));

    let (low, high) = tokio::join!(submit(&state, "low"), submit(&state, "high"));
    let low_id = ticket_of(&low);
    let high_id = ticket_of(&high);
    assert_ne!(low_id, high_id);

    let low_rows: Vec<_> = state.data.fetch(&low_id.to_ticket()).unwrap().collect();
    let high_rows: Vec<_> = state.data.fetch(&high_id.to_ticket()).unwrap().collect();
    assert_eq!(id_values(&low_rows), (0..5).collect::<Vec<i64>>());
    assert_eq!(id_values(&high_rows), (1000..1007).collect::<Vec<i64>>());
}

#[tokio::test]
async fn many_parallel_submissions_of_one_plan_agree() {
    let backend = Arc::new(select_all_backend().with_delay(Duration::from_millis(10)));
    let state = app_state(backend.clone());

    let mut handles = Vec::new();
    for _ in 0..8 {
        let state = state.clone();
        handles.push(tokio::spawn(async move { submit(&state, "select-all").await }));
    }

    let expected = PlanHasher::hash_bytes(b"select-all");
    for handle in handles {
        assert_eq!(ticket_of(&handle.await.unwrap()), expected);
    }
    assert_eq!(state.queries.cache().len(), 1);
    assert!(backend.executions() >= 1);
}

#[tokio::test]
async fn execution_timeout_fails_the_query() {
    let backend = select_all_backend().with_delay(Duration::from_secs(30));
    let options = QueryOptions {
        execute_timeout: Some(Duration::from_millis(50)),
        ..Default::default()
    };
    let state = app_state_with(Arc::new(backend), options);

    let messages = submit(&state, "select-all").await;
    assert!(matches!(messages.last(), Some(ControlMessage::Error(d)) if d.contains("timed out")));
    assert!(state.queries.cache().is_empty());
}

#[tokio::test]
async fn dropping_the_stream_cancels_execution() {
    let backend = Arc::new(select_all_backend().with_delay(Duration::from_secs(30)));
    let state = app_state(backend.clone());

    let mut stream = state.queries.submit("select-all".into());
    assert_eq!(
        stream.next().await,
        Some(ControlMessage::Progress(Progress::Received))
    );
    drop(stream);

    let deadline = Instant::now() + Duration::from_secs(5);
    while state.queries.active_queries() > 0 && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(state.queries.active_queries(), 0);
    assert!(state.queries.cache().is_empty());
}

#[tokio::test]
async fn catalog_lists_datasets_with_row_counts() {
    let backend = MemoryBackend::with_tables(vec![
        ("a".to_string(), id_schema(), vec![ids(0, 10)]),
        ("b".to_string(), id_schema(), vec![]),
    ])
    .unwrap();
    let state = app_state(Arc::new(backend));

    let listed = state.catalog.list().await.unwrap();
    let rows: Vec<(String, u64)> = listed
        .iter()
        .map(|d| (d.dataset.name.clone(), d.dataset.row_count))
        .collect();
    assert_eq!(rows, vec![("a".to_string(), 10), ("b".to_string(), 0)]);
    assert!(listed.iter().all(|d| d.location == LOCATION));
}

#[tokio::test]
async fn release_then_resubmit_executes_again() {
    let backend = Arc::new(select_all_backend());
    let state = app_state(backend.clone());

    let ticket = ticket_of(&submit(&state, "select-all").await).to_ticket();
    state.data.release(&ticket).unwrap();
    assert!(matches!(
        state.data.fetch(&ticket),
        Err(ServiceError::InvalidTicket(_))
    ));

    let again = submit(&state, "select-all").await;
    assert_eq!(again[1], ControlMessage::Progress(Progress::Executed));
    assert_eq!(backend.executions(), 2);
}

#[tokio::test]
async fn releasing_one_ticket_leaves_a_shared_result_readable() {
    let backend = Arc::new(select_all_backend());
    let state = app_state(backend.clone());

    let first = ticket_of(&submit(&state, "select-all").await).to_ticket();
    let second = ticket_of(&submit(&state, "select-all").await).to_ticket();
    assert_eq!(first, second);

    state.data.release(&first).unwrap();
    let batches: Vec<_> = state.data.fetch(&second).unwrap().collect();
    assert_eq!(id_values(&batches), vec![0, 1, 2]);

    state.data.release(&second).unwrap();
    assert!(matches!(
        state.data.fetch(&second),
        Err(ServiceError::InvalidTicket(_))
    ));
    assert_eq!(backend.executions(), 1);
}

#[tokio::test]
async fn abandoned_cached_submission_does_not_pin_the_result() {
    let options = QueryOptions {
        channel_capacity: 1,
        ..Default::default()
    };
    let state = app_state_with(Arc::new(select_all_backend()), options);
    let ticket = ticket_of(&submit(&state, "select-all").await).to_ticket();

    let mut stream = state.queries.submit("select-all".into());
    assert_eq!(
        stream.next().await,
        Some(ControlMessage::Progress(Progress::Received))
    );
    drop(stream);

    let deadline = Instant::now() + Duration::from_secs(5);
    while state.queries.active_queries() > 0 && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    state.data.release(&ticket).unwrap();
    assert!(state.queries.cache().is_empty());
}
