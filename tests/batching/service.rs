//! Loaders used as Tower services.

use super::{GetUserById, GetUserError, UserDirectory, user};
use futures::StreamExt;
use tower::{Service, ServiceBuilder, ServiceExt};
use tower_batching::{BatchError, Engine, ServiceResolver};

#[tokio::test]
async fn test_ready_call() {
    let directory = UserDirectory::new();
    let engine = Engine::new();
    let mut users = engine.loader(directory.resolver());

    let response = users
        .ready()
        .await
        .unwrap()
        .call(GetUserById(1))
        .await
        .unwrap();

    assert_eq!(response, user(1));
}

#[tokio::test]
async fn test_call_all_batches_a_stream() {
    let directory = UserDirectory::new();
    let engine = Engine::new();
    let users = engine.loader(directory.resolver());

    let requests = futures::stream::iter([1, 2, 3, 2].map(GetUserById));
    let responses: Vec<_> = users.call_all(requests).collect().await;

    let ids: Vec<u64> = responses.into_iter().map(|r| r.unwrap().id).collect();
    assert_eq!(ids, vec![1, 2, 3, 2]);
    assert_eq!(directory.calls(), 1);
}

#[tokio::test]
async fn test_composes_with_tower_middleware() {
    let directory = UserDirectory::new().without(2);
    let engine = Engine::new();
    let users = engine.loader(directory.resolver());

    let mut names = ServiceBuilder::new()
        .map_response(|user: super::User| user.name)
        .map_err(|err: BatchError<GetUserError>| err.to_string())
        .service(users);

    let name = names.ready().await.unwrap().call(GetUserById(1)).await;
    assert_eq!(name, Ok("user-1".to_string()));

    let missing = names.ready().await.unwrap().call(GetUserById(2)).await;
    assert_eq!(missing, Err("resolver error: user 2 not found".to_string()));
}

#[tokio::test]
async fn test_tower_service_as_resolver() {
    let backend = tower::service_fn(|batch: Vec<GetUserById>| async move {
        if batch.len() > 10 {
            return Err(GetUserError::Unavailable);
        }
        Ok(batch
            .into_iter()
            .map(|GetUserById(id)| Ok(user(id)))
            .collect::<Vec<Result<super::User, GetUserError>>>())
    });

    let engine = Engine::new();
    let users = engine.loader(ServiceResolver::new("users-http", backend));
    assert_eq!(users.name(), "users-http");

    let results = users.issue_all([1, 2].map(GetUserById)).await;
    assert_eq!(results, vec![Ok(user(1)), Ok(user(2))]);

    let too_many = users.issue_all((100..111).map(GetUserById)).await;
    assert!(too_many
        .iter()
        .all(|r| r == &Err(BatchError::Resolver(GetUserError::Unavailable))));
}
