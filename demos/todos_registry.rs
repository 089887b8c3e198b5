//! Looking services up from a registry
//!
//! The todo query depends on a `TodosService` rather than on a concrete
//! resolver. The live implementation is assembled at startup from an
//! `HttpService` found in the same registry, so a test build can register a
//! different one without touching the query code.
//! Run with: cargo run --example todos_registry

use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tower_batching::{
    BatchError, Engine, Loader, Registry, RegistryError, Request, Resolver, per_request_fn,
};

#[derive(Debug, Clone)]
struct Todo {
    id: u64,
    message: String,
}

#[derive(Debug, Clone, Error)]
#[error("could not load todos: {0}")]
struct GetTodosError(String);

struct GetTodos;

impl Request for GetTodos {
    type Key = ();
    type Value = Vec<Todo>;
    type Error = GetTodosError;

    fn key(&self) {}
}

/// Minimal HTTP abstraction.
trait HttpService: Send + Sync {
    fn fetch(&self, url: &str) -> BoxFuture<'static, Result<Vec<Todo>, String>>;
}

/// Pretends to be a remote server.
struct FakeHttp;

impl HttpService for FakeHttp {
    fn fetch(&self, url: &str) -> BoxFuture<'static, Result<Vec<Todo>, String>> {
        println!("  [http] GET {}", url);
        Box::pin(async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok(vec![
                Todo {
                    id: 1,
                    message: "buy milk".to_string(),
                },
                Todo {
                    id: 2,
                    message: "walk the dog".to_string(),
                },
            ])
        })
    }
}

/// What query code depends on.
trait TodosService: Send + Sync {
    fn get_todos(&self) -> BoxFuture<'_, Result<Vec<Todo>, BatchError<GetTodosError>>>;
}

type TodosResolver = Arc<dyn Resolver<Request = GetTodos>>;

struct TodosServiceLive {
    todos: Loader<TodosResolver>,
}

impl TodosServiceLive {
    /// Builds the live service from the registry's `HttpService`.
    fn from_registry(engine: &Engine, registry: &Registry) -> Result<Self, RegistryError> {
        let http = registry.lookup::<dyn HttpService>()?;
        let resolver: TodosResolver = Arc::new(per_request_fn("todos", move |_: GetTodos| {
            let response = http.fetch("https://api.example.demo/todos");
            async move { response.await.map_err(GetTodosError) }
        }));
        Ok(Self {
            todos: engine.loader(resolver),
        })
    }
}

impl TodosService for TodosServiceLive {
    fn get_todos(&self) -> BoxFuture<'_, Result<Vec<Todo>, BatchError<GetTodosError>>> {
        Box::pin(self.todos.issue(GetTodos))
    }
}

/// Query code: only knows the registry.
async fn get_todos(registry: &Registry) -> Result<Vec<Todo>, Box<dyn std::error::Error>> {
    let service = registry.lookup::<dyn TodosService>()?;
    Ok(service.get_todos().await?)
}

/// A stand-in used where no network is wanted.
struct TodosServiceEmpty;

impl TodosService for TodosServiceEmpty {
    fn get_todos(&self) -> BoxFuture<'_, Result<Vec<Todo>, BatchError<GetTodosError>>> {
        Box::pin(async { Ok(Vec::new()) })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    println!("=== Services From A Registry ===\n");

    let engine = Engine::builder().name("registry-demo").build();

    let mut registry = Registry::new().with::<dyn HttpService>(Arc::new(FakeHttp));
    let live = TodosServiceLive::from_registry(&engine, &registry)?;
    registry.register::<dyn TodosService>(Arc::new(live));
    println!("Registry: {:?}\n", registry);

    println!("--- Three concurrent callers, one request ---");
    let (a, b, c) = futures::join!(
        get_todos(&registry),
        get_todos(&registry),
        get_todos(&registry)
    );
    for todos in [a?, b?, c?] {
        let summary: Vec<String> = todos
            .iter()
            .map(|t| format!("#{} {}", t.id, t.message))
            .collect();
        println!("  got {:?}", summary);
    }

    println!("\n--- Swapping the implementation ---");
    let offline = Registry::new().with::<dyn TodosService>(Arc::new(TodosServiceEmpty));
    println!("  got {} todo(s)", get_todos(&offline).await?.len());

    println!("\n--- A registry without the service ---");
    match get_todos(&Registry::new()).await {
        Ok(_) => println!("  unexpectedly found a service"),
        Err(e) => println!("  lookup failed: {}", e),
    }

    Ok(())
}
