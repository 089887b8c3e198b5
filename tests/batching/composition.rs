//! Composing dependent requests.

use super::{GetUserById, GetUserError, Outbox, SendEmail, SendEmailError, User, UserDirectory};
use std::sync::Arc;
use thiserror::Error;
use tower_batching::{
    BatchError, Engine, Loader, Registry, RegistryError, Resolver, compose,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
enum NotifyError {
    #[error(transparent)]
    User(#[from] BatchError<GetUserError>),
    #[error(transparent)]
    Email(#[from] BatchError<SendEmailError>),
}

#[derive(Debug, Clone)]
struct Todo {
    message: String,
    owner_id: u64,
}

fn todo(message: &str, owner_id: u64) -> Todo {
    Todo {
        message: message.to_string(),
        owner_id,
    }
}

struct Notifier<U: Resolver<Request = GetUserById>, E: Resolver<Request = SendEmail>> {
    users: Loader<U>,
    emails: Loader<E>,
}

impl<U, E> Notifier<U, E>
where
    U: Resolver<Request = GetUserById>,
    E: Resolver<Request = SendEmail>,
{
    async fn send_email_to_user(&self, id: u64, text: String) -> Result<(), NotifyError> {
        compose::and_then(self.users.issue(GetUserById(id)), |user: User| async move {
            self.emails
                .issue(SendEmail {
                    address: user.email,
                    text,
                })
                .await
                .map_err(NotifyError::from)
        })
        .await
    }

    async fn notify_owner(&self, todo: &Todo) -> Result<(), NotifyError> {
        let owner = self.users.issue(GetUserById(todo.owner_id)).await?;
        let text = format!("hey {} you got a todo: {}", owner.name, todo.message);
        self.send_email_to_user(owner.id, text).await
    }
}

fn notifier(
    directory: &UserDirectory,
    outbox: &Outbox,
) -> Notifier<impl Resolver<Request = GetUserById>, impl Resolver<Request = SendEmail>> {
    let engine = Engine::new();
    Notifier {
        users: engine.loader(directory.resolver()),
        emails: engine.loader(outbox.resolver()),
    }
}

#[tokio::test]
async fn test_notify_owner_sends_one_email() {
    let directory = UserDirectory::new();
    let outbox = Outbox::new();
    let notifier = notifier(&directory, &outbox);

    notifier
        .notify_owner(&todo("water the plants", 1))
        .await
        .unwrap();

    let sent = outbox.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].address, "user-1@example.demo");
    assert_eq!(sent[0].text, "hey user-1 you got a todo: water the plants");
}

#[tokio::test]
async fn test_failed_user_lookup_never_sends_email() {
    let directory = UserDirectory::new().without(2);
    let outbox = Outbox::new();
    let notifier = notifier(&directory, &outbox);

    let result = notifier.notify_owner(&todo("file taxes", 2)).await;

    assert_eq!(
        result,
        Err(NotifyError::User(BatchError::Resolver(GetUserError::NotFound(2))))
    );
    assert!(outbox.sent().is_empty());
}

#[tokio::test]
async fn test_notifying_many_owners_batches_each_step() {
    let directory = UserDirectory::new();
    let outbox = Outbox::new();
    let notifier = notifier(&directory, &outbox);

    let todos = vec![todo("a", 1), todo("b", 2), todo("c", 1)];
    compose::for_each_discard(&todos, |todo| notifier.notify_owner(todo))
        .await
        .unwrap();

    // Owner lookups, the repeated lookups inside send_email_to_user, then
    // the emails themselves.
    assert_eq!(directory.batches(), vec![vec![1, 2], vec![1, 2]]);
    assert_eq!(outbox.sent().len(), 3);
}

#[tokio::test]
async fn test_for_each_stops_at_first_failure() {
    let directory = UserDirectory::new().without(3);
    let outbox = Outbox::new();
    let notifier = notifier(&directory, &outbox);

    let todos = vec![todo("a", 1), todo("b", 3)];
    let result = compose::for_each(&todos, |todo| notifier.notify_owner(todo)).await;

    assert!(matches!(result, Err(NotifyError::User(_))));
    assert!(outbox.sent().iter().all(|email| email.address != "user-3@example.demo"));
}

trait Directory: Send + Sync {
    fn loader(&self) -> &Loader<Arc<dyn Resolver<Request = GetUserById>>>;
}

struct LiveDirectory {
    users: Loader<Arc<dyn Resolver<Request = GetUserById>>>,
}

impl Directory for LiveDirectory {
    fn loader(&self) -> &Loader<Arc<dyn Resolver<Request = GetUserById>>> {
        &self.users
    }
}

#[tokio::test]
async fn test_service_looked_up_from_registry() {
    let directory = UserDirectory::new();
    let engine = Engine::new();
    let resolver: Arc<dyn Resolver<Request = GetUserById>> = Arc::new(directory.resolver());
    let live = LiveDirectory {
        users: engine.loader(resolver),
    };

    let registry = Registry::new().with::<dyn Directory>(Arc::new(live));
    let service = registry.lookup::<dyn Directory>().unwrap();

    let user = service.loader().issue(GetUserById(9)).await.unwrap();
    assert_eq!(user.id, 9);
    assert_eq!(directory.calls(), 1);

    assert_eq!(
        registry.lookup::<Outbox>().unwrap_err(),
        RegistryError::Missing {
            type_name: std::any::type_name::<Outbox>(),
        }
    );
}
