use std::sync::Arc;

use arrow_flight::error::FlightError;
use arrow_flight::{Action, FlightClient, FlightDescriptor, Ticket};
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use tonic::Code;

use flightdeck_core::config::StorageConfig;
use flightdeck_core::PlanHasher;
use flightdeck_storage::{MemoryBackend, StorageEngine};

use crate::helpers::*;

fn status_code(err: &FlightError) -> Option<Code> {
    match err {
        FlightError::Tonic(status) => Some(status.code()),
        _ => None,
    }
}

/// Run an action and collect every item, including a trailing error.
async fn action_items(
    client: &mut FlightClient,
    kind: &str,
    body: impl Into<Bytes>,
) -> Vec<Result<Bytes, FlightError>> {
    match client.do_action(Action::new(kind, body.into())).await {
        Ok(stream) => stream.collect().await,
        Err(e) => vec![Err(e)],
    }
}

/// Status code of a `DoGet` that is expected to fail.
async fn do_get_error(client: &mut FlightClient, ticket: impl Into<Bytes>) -> Option<Code> {
    match client.do_get(Ticket::new(ticket.into())).await {
        Ok(stream) => match stream.try_collect::<Vec<_>>().await {
            Ok(_) => None,
            Err(e) => status_code(&e),
        },
        Err(e) => status_code(&e),
    }
}

#[tokio::test]
async fn query_then_do_get_round_trip() {
    let server = TestServer::start(app_state(Arc::new(select_all_backend()))).await;
    let mut client = server.client().await;

    let items = action_items(&mut client, "query", "select-all").await;
    let bodies: Vec<Bytes> = items.into_iter().map(|r| r.unwrap()).collect();
    let expected_ticket = PlanHasher::hash_bytes(b"select-all").to_hex();
    assert_eq!(bodies.len(), 3);
    assert_eq!(bodies[0], "received");
    assert_eq!(bodies[1], "executed");
    assert_eq!(bodies[2], expected_ticket);

    let batches: Vec<_> = client
        .do_get(Ticket::new(bodies[2].clone()))
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(id_values(&batches), vec![0, 1, 2]);
    assert_eq!(batches[0].schema(), id_schema());
}

#[tokio::test]
async fn failed_query_ends_with_internal_status() {
    let server = TestServer::start(app_state(Arc::new(select_all_backend()))).await;
    let mut client = server.client().await;

    let items = action_items(&mut client, "query", "no such plan").await;
    assert!(matches!(&items[0], Ok(body) if body == "received"));

    let err = items.last().unwrap().as_ref().unwrap_err();
    assert_eq!(status_code(err), Some(Code::Internal));
    match err {
        FlightError::Tonic(status) => assert!(status.message().contains("unsupported plan")),
        other => panic!("unexpected error {other}"),
    }
}

#[tokio::test]
async fn bad_tickets_map_to_distinct_statuses() {
    let server = TestServer::start(app_state(Arc::new(select_all_backend()))).await;
    let mut client = server.client().await;

    let never = PlanHasher::hash_bytes(b"never").to_ticket();
    assert_eq!(do_get_error(&mut client, never).await, Some(Code::NotFound));
    assert_eq!(
        do_get_error(&mut client, "zz-not-hex").await,
        Some(Code::InvalidArgument)
    );
}

#[tokio::test]
async fn unknown_action_is_unimplemented() {
    let server = TestServer::start(app_state(Arc::new(select_all_backend()))).await;
    let mut client = server.client().await;

    let items = action_items(&mut client, "drop_table", "t").await;
    assert_eq!(items.len(), 1);
    assert_eq!(
        status_code(items[0].as_ref().unwrap_err()),
        Some(Code::Unimplemented)
    );
}

#[tokio::test]
async fn release_action_drops_the_result() {
    let server = TestServer::start(app_state(Arc::new(select_all_backend()))).await;
    let mut client = server.client().await;

    let items = action_items(&mut client, "query", "select-all").await;
    let ticket = items.last().unwrap().as_ref().unwrap().clone();

    let released = action_items(&mut client, "release", ticket.clone()).await;
    assert_eq!(released.len(), 1);
    assert_eq!(released[0].as_ref().unwrap(), &ticket);

    assert_eq!(do_get_error(&mut client, ticket.clone()).await, Some(Code::NotFound));
    let again = action_items(&mut client, "release", ticket).await;
    assert_eq!(
        status_code(again[0].as_ref().unwrap_err()),
        Some(Code::NotFound)
    );
}

#[tokio::test]
async fn list_actions_advertises_query_and_release() {
    let server = TestServer::start(app_state(Arc::new(select_all_backend()))).await;
    let mut client = server.client().await;

    let kinds: Vec<String> = client
        .list_actions()
        .await
        .unwrap()
        .map_ok(|a| a.r#type)
        .try_collect()
        .await
        .unwrap();
    assert_eq!(kinds, vec!["query", "release"]);
}

#[tokio::test]
async fn discovery_describes_every_dataset() {
    let backend = MemoryBackend::with_tables(vec![
        ("a".to_string(), id_schema(), vec![ids(0, 10)]),
        ("b".to_string(), id_schema(), vec![]),
    ])
    .unwrap();
    let server = TestServer::start(app_state(Arc::new(backend))).await;
    let mut client = server.client().await;

    let infos: Vec<_> = client
        .list_flights(Bytes::new())
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(infos.len(), 2);

    let a = infos
        .iter()
        .find(|i| i.flight_descriptor.as_ref().map(|d| d.path.clone()) == Some(vec!["a".to_string()]))
        .unwrap();
    assert_eq!(a.total_records, 10);
    assert_eq!(a.endpoint[0].location[0].uri, LOCATION);
    assert_eq!(a.clone().try_decode_schema().unwrap(), *id_schema());

    let b = client
        .get_flight_info(FlightDescriptor::new_path(vec!["b".to_string()]))
        .await
        .unwrap();
    assert_eq!(b.total_records, 0);

    let schema = client
        .get_schema(FlightDescriptor::new_path(vec!["a".to_string()]))
        .await
        .unwrap();
    assert_eq!(schema, *id_schema());

    let missing = client
        .get_flight_info(FlightDescriptor::new_path(vec!["zzz".to_string()]))
        .await
        .unwrap_err();
    assert_eq!(status_code(&missing), Some(Code::NotFound));
}

#[tokio::test]
async fn empty_result_still_carries_schema() {
    let backend = ScriptedBackend::new()
        .with_table("empty", vec![])
        .with_plan(b"scan empty", "empty");
    let server = TestServer::start(app_state(Arc::new(backend))).await;
    let mut client = server.client().await;

    let items = action_items(&mut client, "query", "scan empty").await;
    let ticket = items.last().unwrap().as_ref().unwrap().clone();

    let mut stream = client.do_get(Ticket::new(ticket)).await.unwrap();
    let mut batches = Vec::new();
    while let Some(batch) = stream.next().await {
        batches.push(batch.unwrap());
    }
    assert!(batches.is_empty());
    assert_eq!(stream.schema().map(|s| s.as_ref().clone()), Some(id_schema().as_ref().clone()));
}

#[tokio::test]
async fn serves_sample_csv_files_from_the_data_dir() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(tmp.path().join("test")).unwrap();
    std::fs::write(tmp.path().join("test/sample.csv"), "id\n7\n8\n9\n10\n").unwrap();

    let config = StorageConfig {
        backend: "memory".to_string(),
        data_dir: tmp.path().to_path_buf(),
        load_sample_data: true,
    };
    let storage = StorageEngine::from_config(&config).unwrap();
    assert_eq!(storage.load_sample_data().await.unwrap(), 1);

    let server = TestServer::start(app_state(storage.backend.clone())).await;
    let mut client = server.client().await;

    let info = client
        .get_flight_info(FlightDescriptor::new_path(vec!["test_sample".to_string()]))
        .await
        .unwrap();
    assert_eq!(info.total_records, 4);

    // the in-memory backend treats a plan as the name of the dataset to scan
    let items = action_items(&mut client, "query", "test_sample").await;
    let ticket = items.last().unwrap().as_ref().unwrap().clone();
    let batches: Vec<_> = client
        .do_get(Ticket::new(ticket))
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(id_values(&batches), vec![7, 8, 9, 10]);
}
