use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use quillpost_core::{Account, AccountId, NewAccount, NewPost, Page, PageRequest, Post, PostId};
use quillpost_storage::{AccountStorage, PostStorage, StorageError, StorageResult};
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct State {
    accounts: BTreeMap<AccountId, Account>,
    /// username -> account id
    usernames: HashMap<String, AccountId>,
    posts: BTreeMap<PostId, Post>,
    last_account_id: i64,
    last_post_id: i64,
}

impl State {
    fn next_account_id(&mut self) -> AccountId {
        self.last_account_id += 1;
        AccountId::new(self.last_account_id)
    }

    fn next_post_id(&mut self) -> PostId {
        self.last_post_id += 1;
        PostId::new(self.last_post_id)
    }

    fn owned_mut(&mut self, id: PostId, owner: AccountId) -> Option<&mut Post> {
        self.posts.get_mut(&id).filter(|p| p.owner_id == owner)
    }
}

/// In-memory account and post storage.
///
/// Identifiers are assigned from per-kind counters starting at 1 and are
/// never reused, even after a delete.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    state: RwLock<State>,
}

impl InMemoryStorage {
    /// Creates an empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored accounts.
    pub async fn account_count(&self) -> usize {
        self.state.read().await.accounts.len()
    }

    /// Number of stored posts across all owners.
    pub async fn post_count(&self) -> usize {
        self.state.read().await.posts.len()
    }
}

#[async_trait]
impl AccountStorage for InMemoryStorage {
    async fn create(&self, account: NewAccount) -> StorageResult<Account> {
        let mut state = self.state.write().await;
        if state.usernames.contains_key(&account.username) {
            return Err(StorageError::conflict(format!(
                "username '{}' already exists",
                account.username
            )));
        }

        let id = state.next_account_id();
        let account = account.into_account(id);
        state.usernames.insert(account.username.clone(), id);
        state.accounts.insert(id, account.clone());
        Ok(account)
    }

    async fn find_by_username(&self, username: &str) -> StorageResult<Option<Account>> {
        let state = self.state.read().await;
        Ok(state
            .usernames
            .get(username)
            .and_then(|id| state.accounts.get(id))
            .cloned())
    }
}

#[async_trait]
impl PostStorage for InMemoryStorage {
    async fn create(&self, post: NewPost) -> StorageResult<Post> {
        let mut state = self.state.write().await;
        // Mirrors the owner foreign key of the relational backend.
        if !state.accounts.contains_key(&post.owner_id) {
            return Err(StorageError::internal(format!(
                "owner account {} does not exist",
                post.owner_id
            )));
        }
        let id = state.next_post_id();
        let post = post.into_post(id);
        state.posts.insert(id, post.clone());
        Ok(post)
    }

    async fn find_owned(&self, id: PostId, owner: AccountId) -> StorageResult<Option<Post>> {
        let state = self.state.read().await;
        Ok(state
            .posts
            .get(&id)
            .filter(|p| p.owner_id == owner)
            .cloned())
    }

    async fn update_owned(
        &self,
        id: PostId,
        owner: AccountId,
        title: &str,
        body: &str,
    ) -> StorageResult<Option<Post>> {
        let mut state = self.state.write().await;
        let Some(post) = state.owned_mut(id, owner) else {
            return Ok(None);
        };
        post.title = title.to_string();
        post.body = body.to_string();
        Ok(Some(post.clone()))
    }

    async fn delete_owned(&self, id: PostId, owner: AccountId) -> StorageResult<bool> {
        let mut state = self.state.write().await;
        if state.owned_mut(id, owner).is_none() {
            return Ok(false);
        }
        Ok(state.posts.remove(&id).is_some())
    }

    async fn list_owned(&self, owner: AccountId, page: PageRequest) -> StorageResult<Page<Post>> {
        let state = self.state.read().await;
        let owned = state.posts.values().filter(|p| p.owner_id == owner);
        let total = owned.clone().count() as u64;

        let offset = usize::try_from(page.offset()).unwrap_or(usize::MAX);
        let limit = usize::try_from(page.limit()).unwrap_or(usize::MAX);
        let items = owned.skip(offset).take(limit).cloned().collect();

        Ok(Page::new(items, total, page))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn new_account(username: &str) -> NewAccount {
        NewAccount::new(username, "$argon2id$v=19$stub")
    }

    /// Storage holding accounts 1 and 2.
    async fn with_two_accounts() -> InMemoryStorage {
        let storage = InMemoryStorage::new();
        for username in ["alice@x.com", "bob@x.com"] {
            AccountStorage::create(&storage, new_account(username))
                .await
                .unwrap();
        }
        storage
    }

    #[tokio::test]
    async fn test_create_account_assigns_ascending_ids() {
        let storage = InMemoryStorage::new();
        let a = AccountStorage::create(&storage, new_account("a@x.com")).await.unwrap();
        let b = AccountStorage::create(&storage, new_account("b@x.com")).await.unwrap();

        assert_eq!(a.id, AccountId::new(1));
        assert_eq!(b.id, AccountId::new(2));
        assert_eq!(storage.account_count().await, 2);
    }

    #[tokio::test]
    async fn test_duplicate_username_is_conflict() {
        let storage = InMemoryStorage::new();
        AccountStorage::create(&storage, new_account("a@x.com")).await.unwrap();

        let err = AccountStorage::create(&storage, new_account("a@x.com"))
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(storage.account_count().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_signup_same_username_single_winner() {
        let storage = Arc::new(InMemoryStorage::new());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let storage = storage.clone();
            handles.push(tokio::spawn(async move {
                AccountStorage::create(storage.as_ref(), new_account("race@x.com")).await
            }));
        }

        let mut ok = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                ok += 1;
            }
        }
        assert_eq!(ok, 1);
        assert_eq!(storage.account_count().await, 1);
    }

    #[tokio::test]
    async fn test_find_by_username() {
        let storage = InMemoryStorage::new();
        let created = AccountStorage::create(&storage, new_account("a@x.com")).await.unwrap();

        let found = storage.find_by_username("a@x.com").await.unwrap();
        assert_eq!(found, Some(created));
        assert!(storage.find_by_username("A@x.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_posts_are_scoped_by_owner() {
        let storage = with_two_accounts().await;
        let alice = AccountId::new(1);
        let bob = AccountId::new(2);
        let post = PostStorage::create(&storage, NewPost::new(alice, "Hi", "World"))
            .await
            .unwrap();

        assert!(storage.find_owned(post.id, alice).await.unwrap().is_some());
        assert!(storage.find_owned(post.id, bob).await.unwrap().is_none());

        let updated = storage.update_owned(post.id, bob, "X", "Y").await.unwrap();
        assert!(updated.is_none());
        assert!(!storage.delete_owned(post.id, bob).await.unwrap());

        let unchanged = storage.find_owned(post.id, alice).await.unwrap().unwrap();
        assert_eq!(unchanged.title, "Hi");
        assert_eq!(unchanged.body, "World");
    }

    #[tokio::test]
    async fn test_update_keeps_timestamp_and_owner() {
        let storage = with_two_accounts().await;
        let owner = AccountId::new(1);
        let post = PostStorage::create(&storage, NewPost::new(owner, "Hi", "World"))
            .await
            .unwrap();

        let updated = storage
            .update_owned(post.id, owner, "New", "Body")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.title, "New");
        assert_eq!(updated.body, "Body");
        assert_eq!(updated.created_at, post.created_at);
        assert_eq!(updated.owner_id, owner);
    }

    #[tokio::test]
    async fn test_delete_does_not_reuse_ids() {
        let storage = with_two_accounts().await;
        let owner = AccountId::new(1);
        let first = PostStorage::create(&storage, NewPost::new(owner, "a", "a"))
            .await
            .unwrap();
        assert!(storage.delete_owned(first.id, owner).await.unwrap());
        assert!(storage.find_owned(first.id, owner).await.unwrap().is_none());

        let second = PostStorage::create(&storage, NewPost::new(owner, "b", "b"))
            .await
            .unwrap();
        assert_eq!(second.id, PostId::new(2));
    }

    #[tokio::test]
    async fn test_list_paginates_in_id_order() {
        let storage = with_two_accounts().await;
        let owner = AccountId::new(1);
        let other = AccountId::new(2);
        for i in 0..25 {
            PostStorage::create(&storage, NewPost::new(owner, format!("t{i}"), "b"))
                .await
                .unwrap();
            PostStorage::create(&storage, NewPost::new(other, "other", "b"))
                .await
                .unwrap();
        }

        let page = storage
            .list_owned(owner, PageRequest { page: 3, per_page: 10 })
            .await
            .unwrap();
        assert_eq!(page.total, 25);
        assert_eq!(page.pages(), 3);
        assert_eq!(page.items.len(), 5);
        assert_eq!(page.items[0].title, "t20");
        assert!(page.items.iter().all(|p| p.owner_id == owner));

        let beyond = storage
            .list_owned(owner, PageRequest { page: 9, per_page: 10 })
            .await
            .unwrap();
        assert!(beyond.items.is_empty());
        assert_eq!(beyond.total, 25);
    }

    #[tokio::test]
    async fn test_post_for_unknown_owner_is_rejected() {
        let storage = with_two_accounts().await;

        let err = PostStorage::create(&storage, NewPost::new(AccountId::new(42), "Hi", "World"))
            .await
            .unwrap_err();
        assert!(!err.is_conflict());
        assert_eq!(storage.post_count().await, 0);

        // The failed insert does not consume an id.
        let post = PostStorage::create(&storage, NewPost::new(AccountId::new(1), "Hi", "World"))
            .await
            .unwrap();
        assert_eq!(post.id, PostId::new(1));
    }
}
