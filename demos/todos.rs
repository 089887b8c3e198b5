//! Todo notifications with batched, deduplicated lookups
//!
//! Fetches the todo list, then notifies every todo's owner by email. Owner
//! lookups are collected into one batch per window, duplicate owners share a
//! single lookup, and all emails go out in one batch.
//! Run with: cargo run --example todos

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error;
use tower_batching::{
    BatchError, BatchOutcome, Engine, Loader, Request, Resolver, ResolverExt, compose, resolver_fn,
};

#[derive(Debug, Clone)]
struct Todo {
    id: u64,
    message: String,
    owner_id: u64,
}

#[derive(Debug, Clone)]
struct User {
    id: u64,
    name: String,
    email: String,
}

#[derive(Debug, Clone, Error)]
#[error("could not load todos")]
struct GetTodosError;

#[derive(Debug, Clone, Error)]
enum GetUserError {
    #[error("user {0} not found")]
    NotFound(u64),
}

#[derive(Debug, Clone, Error)]
#[error("could not send email to {0}")]
struct SendEmailError(String);

#[derive(Debug, Error)]
enum AppError {
    #[error(transparent)]
    Todos(#[from] BatchError<GetTodosError>),
    #[error(transparent)]
    User(#[from] BatchError<GetUserError>),
    #[error(transparent)]
    Email(#[from] BatchError<SendEmailError>),
}

struct GetTodos;

impl Request for GetTodos {
    type Key = ();
    type Value = Vec<Todo>;
    type Error = GetTodosError;

    fn key(&self) {}
}

struct GetUserById(u64);

impl Request for GetUserById {
    type Key = u64;
    type Value = User;
    type Error = GetUserError;

    fn key(&self) -> u64 {
        self.0
    }
}

struct SendEmail {
    address: String,
    text: String,
}

impl Request for SendEmail {
    type Key = (String, String);
    type Value = ();
    type Error = SendEmailError;

    fn key(&self) -> (String, String) {
        (self.address.clone(), self.text.clone())
    }
}

/// Simulated remote API: counts round trips and takes a little while.
#[derive(Clone, Default)]
struct Api {
    round_trips: Arc<AtomicUsize>,
}

impl Api {
    async fn round_trip(&self, endpoint: &str, size: usize) {
        let n = self.round_trips.fetch_add(1, Ordering::SeqCst) + 1;
        println!("  [api] round trip #{} to {} ({} item(s))", n, endpoint, size);
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    fn todos(&self) -> impl Resolver<Request = GetTodos> {
        let api = self.clone();
        resolver_fn("todos", move |batch: Vec<GetTodos>| {
            let api = api.clone();
            async move {
                api.round_trip("/todos", batch.len()).await;
                let todos = vec![
                    todo(1, "buy milk", 1),
                    todo(2, "walk the dog", 2),
                    todo(3, "fix the fence", 1),
                    todo(4, "call grandma", 3),
                ];
                let outcome: BatchOutcome<GetTodos> =
                    Ok(batch.iter().map(|_| Ok(todos.clone())).collect());
                outcome
            }
        })
    }

    fn users(&self) -> impl Resolver<Request = GetUserById> {
        let api = self.clone();
        resolver_fn("users", move |batch: Vec<GetUserById>| {
            let api = api.clone();
            async move {
                api.round_trip("/users", batch.len()).await;
                let outcome: BatchOutcome<GetUserById> = Ok(batch
                    .iter()
                    .map(|GetUserById(id)| match id {
                        1..=3 => Ok(User {
                            id: *id,
                            name: format!("user-{}", id),
                            email: format!("user-{}@example.demo", id),
                        }),
                        _ => Err(GetUserError::NotFound(*id)),
                    })
                    .collect());
                outcome
            }
        })
    }

    fn emails(&self) -> impl Resolver<Request = SendEmail> {
        let api = self.clone();
        resolver_fn("emails", move |batch: Vec<SendEmail>| {
            let api = api.clone();
            async move {
                api.round_trip("/emails", batch.len()).await;
                let outcome: BatchOutcome<SendEmail> = Ok(batch
                    .iter()
                    .map(|email| {
                        println!("  [mail] to {}: {}", email.address, email.text);
                        Ok(())
                    })
                    .collect());
                outcome
            }
        })
    }
}

fn todo(id: u64, message: &str, owner_id: u64) -> Todo {
    Todo {
        id,
        message: message.to_string(),
        owner_id,
    }
}

/// The queries of the application, one loader per request kind.
struct Queries<T, U, E>
where
    T: Resolver<Request = GetTodos>,
    U: Resolver<Request = GetUserById>,
    E: Resolver<Request = SendEmail>,
{
    todos: Loader<T>,
    users: Loader<U>,
    emails: Loader<E>,
}

impl<T, U, E> Queries<T, U, E>
where
    T: Resolver<Request = GetTodos>,
    U: Resolver<Request = GetUserById>,
    E: Resolver<Request = SendEmail>,
{
    async fn get_todos(&self) -> Result<Vec<Todo>, AppError> {
        Ok(self.todos.issue(GetTodos).await?)
    }

    async fn get_user_by_id(&self, id: u64) -> Result<User, AppError> {
        Ok(self.users.issue(GetUserById(id)).await?)
    }

    async fn send_email(&self, address: String, text: String) -> Result<(), AppError> {
        Ok(self.emails.issue(SendEmail { address, text }).await?)
    }

    async fn send_email_to_user(&self, id: u64, message: String) -> Result<(), AppError> {
        compose::and_then(self.get_user_by_id(id), |user| {
            self.send_email(user.email, message)
        })
        .await
    }

    async fn notify_owner(&self, todo: &Todo) -> Result<(), AppError> {
        let owner = self.get_user_by_id(todo.owner_id).await?;
        self.send_email_to_user(
            owner.id,
            format!("hey {} you got a todo (#{}: {})!", owner.name, todo.id, todo.message),
        )
        .await
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    println!("=== Batched Todo Notifications ===\n");

    let api = Api::default();
    let engine = Engine::builder()
        .name("todos-app")
        .window(Duration::from_millis(2))
        .on_batch_completed(|name, size, failures| {
            println!("  [engine] {} batch of {} settled ({} failed)", name, size, failures);
        })
        .build();

    let queries = Queries {
        todos: engine.loader(api.todos().cached()),
        users: engine.loader(api.users().cached()),
        emails: engine.loader(api.emails()),
    };

    println!("--- Notify every owner ---");
    let todos = queries.get_todos().await?;
    compose::for_each_discard(&todos, |todo| queries.notify_owner(todo)).await?;

    println!("\n--- Again, with todos and users now cached ---");
    let todos = queries.get_todos().await?;
    compose::for_each_discard(&todos, |todo| queries.notify_owner(todo)).await?;

    println!("\n--- A missing owner short-circuits before any email ---");
    let orphan = todo(99, "nobody's job", 42);
    match queries.notify_owner(&orphan).await {
        Ok(()) => println!("  unexpectedly delivered"),
        Err(e) => println!("  failed: {}", e),
    }

    println!(
        "\nTotal API round trips: {}",
        api.round_trips.load(Ordering::SeqCst)
    );
    Ok(())
}
