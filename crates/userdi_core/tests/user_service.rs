use std::cell::RefCell;
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use userdi_core::db::{open_db, open_db_in_memory, DbError};
use userdi_core::{
    build_user_service, run_demo, DefaultUserService, InMemoryUserRepository, RepoError,
    RepoErrorKind, RepoResult, User, UserId, UserListQuery, UserRepository, UserService,
};

/// Deletes the target record right after it is read, simulating a concurrent
/// delete between the two steps of `update_user`.
struct DeleteAfterRead<'a> {
    inner: &'a InMemoryUserRepository,
}

impl UserRepository for DeleteAfterRead<'_> {
    fn create(&self, user: &mut User) -> RepoResult<()> {
        self.inner.create(user)
    }

    fn get_by_id(&self, id: UserId) -> RepoResult<User> {
        let user = self.inner.get_by_id(id)?;
        self.inner.delete(id)?;
        Ok(user)
    }

    fn update(&self, user: &User) -> RepoResult<()> {
        self.inner.update(user)
    }

    fn delete(&self, id: UserId) -> RepoResult<()> {
        self.inner.delete(id)
    }

    fn find_by_email(&self, email: &str) -> RepoResult<User> {
        self.inner.find_by_email(email)
    }

    fn list(&self, query: &UserListQuery) -> RepoResult<Vec<User>> {
        self.inner.list(query)
    }
}

/// Lets another caller overwrite the record between the read and the write
/// of `update_user`.
struct UpdateAfterRead<'a> {
    inner: &'a InMemoryUserRepository,
    competing: RefCell<Option<User>>,
}

impl UserRepository for UpdateAfterRead<'_> {
    fn create(&self, user: &mut User) -> RepoResult<()> {
        self.inner.create(user)
    }

    fn get_by_id(&self, id: UserId) -> RepoResult<User> {
        let user = self.inner.get_by_id(id)?;
        if let Some(competing) = self.competing.borrow_mut().take() {
            self.inner.update(&competing)?;
        }
        Ok(user)
    }

    fn update(&self, user: &User) -> RepoResult<()> {
        self.inner.update(user)
    }

    fn delete(&self, id: UserId) -> RepoResult<()> {
        self.inner.delete(id)
    }

    fn find_by_email(&self, email: &str) -> RepoResult<User> {
        self.inner.find_by_email(email)
    }

    fn list(&self, query: &UserListQuery) -> RepoResult<Vec<User>> {
        self.inner.list(query)
    }
}

/// Reads succeed, every write fails with a storage error.
struct ReadOnlyStore<'a> {
    inner: &'a InMemoryUserRepository,
}

impl ReadOnlyStore<'_> {
    fn write_failure() -> RepoError {
        RepoError::Storage(DbError::Unavailable("store is read-only".to_string()))
    }
}

impl UserRepository for ReadOnlyStore<'_> {
    fn create(&self, _user: &mut User) -> RepoResult<()> {
        Err(Self::write_failure())
    }

    fn get_by_id(&self, id: UserId) -> RepoResult<User> {
        self.inner.get_by_id(id)
    }

    fn update(&self, _user: &User) -> RepoResult<()> {
        Err(Self::write_failure())
    }

    fn delete(&self, _id: UserId) -> RepoResult<()> {
        Err(Self::write_failure())
    }

    fn find_by_email(&self, email: &str) -> RepoResult<User> {
        self.inner.find_by_email(email)
    }

    fn list(&self, query: &UserListQuery) -> RepoResult<Vec<User>> {
        self.inner.list(query)
    }
}

#[test]
fn example_scenario_on_sqlite() {
    let conn = open_db_in_memory().unwrap();
    let service = build_user_service(&conn).unwrap();

    let created = service
        .create_user("John Doe", "john@example.com")
        .unwrap();
    assert_eq!(created.id, Some(1));

    let fetched = service.get_user(1).unwrap();
    assert_eq!(
        fetched,
        User {
            id: Some(1),
            name: "John Doe".to_string(),
            email: "john@example.com".to_string(),
        }
    );

    service
        .update_user(1, "John Smith", "john@example.com")
        .unwrap();
    let updated = service.get_user(1).unwrap();
    assert_eq!(updated.id, Some(1));
    assert_eq!(updated.name, "John Smith");
    assert_eq!(updated.email, "john@example.com");

    service.delete_user(1).unwrap();
    assert!(matches!(service.get_user(1), Err(RepoError::NotFound(1))));
}

#[test]
fn create_then_get_matches_on_both_adapters() {
    let conn = open_db_in_memory().unwrap();
    let sqlite = build_user_service(&conn).unwrap();
    let memory = DefaultUserService::new(InMemoryUserRepository::new());
    let services: [&dyn UserService; 2] = [&sqlite, &memory];

    for service in services {
        let created = service.create_user("Ada", "ada@example.com").unwrap();
        let fetched = service.get_user(created.id.unwrap()).unwrap();
        assert_eq!(fetched.name, "Ada");
        assert_eq!(fetched.email, "ada@example.com");
    }
}

#[test]
fn duplicate_email_is_conflict_and_creates_nothing() {
    let repo = InMemoryUserRepository::new();
    let service = DefaultUserService::new(&repo);

    service.create_user("First", "dup@example.com").unwrap();
    let err = service.create_user("Second", "dup@example.com").unwrap_err();

    assert_eq!(err.kind(), RepoErrorKind::Conflict);
    assert_eq!(repo.len().unwrap(), 1);
}

#[test]
fn absent_id_is_not_found_and_store_is_unchanged() {
    let repo = InMemoryUserRepository::new();
    let service = DefaultUserService::new(&repo);
    let existing = service.create_user("Keep", "keep@example.com").unwrap();

    assert!(matches!(service.get_user(99), Err(RepoError::NotFound(99))));
    assert!(matches!(
        service.update_user(99, "X", "x@example.com"),
        Err(RepoError::NotFound(99))
    ));
    assert!(matches!(service.delete_user(99), Err(RepoError::NotFound(99))));

    assert_eq!(repo.len().unwrap(), 1);
    assert_eq!(service.get_user(existing.id.unwrap()).unwrap(), existing);
}

#[test]
fn update_keeps_id_and_returns_new_values() {
    let service = DefaultUserService::new(InMemoryUserRepository::new());
    let created = service.create_user("Old", "old@example.com").unwrap();
    let id = created.id.unwrap();

    let updated = service.update_user(id, "New", "new@example.com").unwrap();
    assert_eq!(updated.id, Some(id));
    assert_eq!(service.get_user(id).unwrap(), updated);
}

#[test]
fn update_into_taken_email_is_conflict() {
    let conn = open_db_in_memory().unwrap();
    let service = build_user_service(&conn).unwrap();
    service.create_user("A", "a@example.com").unwrap();
    let b = service.create_user("B", "b@example.com").unwrap();

    let err = service
        .update_user(b.id.unwrap(), "B", "a@example.com")
        .unwrap_err();
    assert!(matches!(err, RepoError::Conflict { .. }));
    assert_eq!(service.get_user(b.id.unwrap()).unwrap().email, "b@example.com");
}

#[test]
fn delete_twice_yields_ok_then_not_found() {
    let conn = open_db_in_memory().unwrap();
    let service = build_user_service(&conn).unwrap();
    let id = service
        .create_user("Twice", "twice@example.com")
        .unwrap()
        .id
        .unwrap();

    service.delete_user(id).unwrap();
    assert!(matches!(service.delete_user(id), Err(RepoError::NotFound(_))));
    assert!(matches!(service.get_user(id), Err(RepoError::NotFound(_))));
}

#[test]
fn delete_between_read_and_write_surfaces_not_found() {
    let store = InMemoryUserRepository::new();
    let mut user = User::new("Racy", "racy@example.com");
    store.create(&mut user).unwrap();
    let id = user.id.unwrap();

    let service = DefaultUserService::new(DeleteAfterRead { inner: &store });
    let err = service
        .update_user(id, "Racy 2", "racy@example.com")
        .unwrap_err();

    assert!(matches!(err, RepoError::NotFound(found) if found == id));
    assert!(store.is_empty().unwrap());
}

#[test]
fn storage_errors_propagate_unchanged() {
    let repo = InMemoryUserRepository::new();
    let service = DefaultUserService::new(&repo);

    repo.fail_next_with_storage("connection reset").unwrap();
    let err = service.create_user("A", "a@example.com").unwrap_err();

    assert_eq!(err.kind(), RepoErrorKind::Storage);
    assert!(err.to_string().contains("connection reset"));
    assert!(repo.is_empty().unwrap());
}

#[test]
fn storage_errors_from_reads_and_deletes_propagate_unchanged() {
    let repo = InMemoryUserRepository::new();
    let service = DefaultUserService::new(&repo);
    let id = service
        .create_user("Kept", "kept@example.com")
        .unwrap()
        .id
        .unwrap();

    repo.fail_next_with_storage("read timeout").unwrap();
    let err = service.get_user(id).unwrap_err();
    assert!(matches!(
        err,
        RepoError::Storage(DbError::Unavailable(ref message)) if message == "read timeout"
    ));

    repo.fail_next_with_storage("delete timeout").unwrap();
    let err = service.delete_user(id).unwrap_err();
    assert!(matches!(
        err,
        RepoError::Storage(DbError::Unavailable(ref message)) if message == "delete timeout"
    ));

    repo.fail_next_with_storage("update read timeout").unwrap();
    let err = service
        .update_user(id, "Changed", "changed@example.com")
        .unwrap_err();
    assert!(matches!(
        err,
        RepoError::Storage(DbError::Unavailable(ref message)) if message == "update read timeout"
    ));

    let stored = service.get_user(id).unwrap();
    assert_eq!(stored.name, "Kept");
    assert_eq!(stored.email, "kept@example.com");
}

#[test]
fn storage_error_from_update_write_is_not_masked() {
    let store = InMemoryUserRepository::new();
    let mut user = User::new("Frozen", "frozen@example.com");
    store.create(&mut user).unwrap();
    let id = user.id.unwrap();

    let service = DefaultUserService::new(ReadOnlyStore { inner: &store });
    let err = service
        .update_user(id, "Thawed", "thawed@example.com")
        .unwrap_err();

    assert!(matches!(
        err,
        RepoError::Storage(DbError::Unavailable(ref message)) if message == "store is read-only"
    ));
    assert_eq!(store.get_by_id(id).unwrap(), user);
}

#[test]
fn interleaved_updates_are_last_write_wins() {
    let store = InMemoryUserRepository::new();
    let mut user = User::new("Start", "start@example.com");
    store.create(&mut user).unwrap();
    let id = user.id.unwrap();

    let service = DefaultUserService::new(UpdateAfterRead {
        inner: &store,
        competing: RefCell::new(Some(User {
            id: Some(id),
            name: "Second".to_string(),
            email: "second@example.com".to_string(),
        })),
    });
    let written = service
        .update_user(id, "First", "first@example.com")
        .unwrap();

    let stored = store.get_by_id(id).unwrap();
    assert_eq!(stored, written);
    assert_eq!(stored.name, "First");
    assert_eq!(stored.email, "first@example.com");
}

#[test]
fn shared_service_handles_concurrent_callers() {
    let service = Arc::new(DefaultUserService::new(InMemoryUserRepository::new()));

    thread::scope(|scope| {
        for worker in 0..4 {
            let service = Arc::clone(&service);
            scope.spawn(move || {
                for index in 0..10 {
                    let key = format!("w{worker}-{index}");
                    let user = service
                        .create_user(&key, &format!("{key}@example.com"))
                        .unwrap();
                    if index % 2 == 0 {
                        service.delete_user(user.id.unwrap()).unwrap();
                    }
                }
            });
        }
    });

    let users = service.list_users(&UserListQuery::default()).unwrap();
    assert_eq!(users.len(), 20);
    let ids: HashSet<_> = users.iter().filter_map(|user| user.id).collect();
    assert_eq!(ids.len(), 20);
    assert!(users
        .iter()
        .all(|user| user.email == format!("{}@example.com", user.name)));
}

#[test]
fn concurrent_creates_with_one_email_store_exactly_one_user() {
    let service = DefaultUserService::new(InMemoryUserRepository::new());

    let outcomes: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let service = &service;
                scope.spawn(move || service.create_user(&format!("w{worker}"), "race@example.com"))
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect()
    });

    assert_eq!(outcomes.iter().filter(|outcome| outcome.is_ok()).count(), 1);
    assert!(outcomes
        .iter()
        .filter_map(|outcome| outcome.as_ref().err())
        .all(|err| err.kind() == RepoErrorKind::Conflict));
    assert_eq!(service.list_users(&UserListQuery::default()).unwrap().len(), 1);
}

#[test]
fn sqlite_callers_each_open_their_own_connection() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("users.db");
    drop(open_db(&path).unwrap());

    thread::scope(|scope| {
        for worker in 0..3 {
            let path = &path;
            scope.spawn(move || {
                let conn = open_db(path).unwrap();
                let service = build_user_service(&conn).unwrap();
                for index in 0..5 {
                    service
                        .create_user("Worker", &format!("w{worker}-{index}@example.com"))
                        .unwrap();
                }
            });
        }
    });

    let conn = open_db(&path).unwrap();
    let service = build_user_service(&conn).unwrap();
    assert_eq!(service.list_users(&UserListQuery::default()).unwrap().len(), 15);
}

#[test]
fn find_and_list_delegate_to_repository() {
    let service = DefaultUserService::new(InMemoryUserRepository::new());
    service.create_user("One", "one@example.com").unwrap();
    let two = service.create_user("Two", "two@example.com").unwrap();

    assert_eq!(service.find_user_by_email("two@example.com").unwrap(), two);
    assert_eq!(service.list_users(&UserListQuery::default()).unwrap().len(), 2);
}

#[test]
fn run_demo_creates_and_fetches_demo_user() {
    let conn = open_db_in_memory().unwrap();
    let service = build_user_service(&conn).unwrap();

    let user = run_demo(&service).unwrap();
    assert_eq!(user.id, Some(1));
    assert_eq!(user.name, "John Doe");
    assert_eq!(user.email, "john@example.com");

    let err = run_demo(&service).unwrap_err();
    assert_eq!(err.kind(), RepoErrorKind::Conflict);
}

#[test]
fn boxed_service_can_be_injected_anywhere() {
    let service: Box<dyn UserService> =
        Box::new(DefaultUserService::new(InMemoryUserRepository::new()));

    let user = run_demo(service.as_ref()).unwrap();
    assert_eq!(user.name, "John Doe");
}

#[test]
fn build_user_service_rejects_unmigrated_connection() {
    let conn = rusqlite::Connection::open_in_memory().unwrap();

    let result = build_user_service(&conn);
    assert!(matches!(
        result,
        Err(RepoError::UninitializedConnection { .. })
    ));
}
