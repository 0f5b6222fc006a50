//! End-to-end router tests against in-memory repositories.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use time::OffsetDateTime;
use tower::ServiceExt;
use uuid::Uuid;

use scribo::application::auth::{AuthService, csrf_token_for, hash_password};
use scribo::application::comments::CommentService;
use scribo::application::feed::FeedService;
use scribo::application::follows::FollowService;
use scribo::application::posts::PostService;
use scribo::application::repos::{
    CommentsRepo, CreateCommentParams, CreateGroupParams, CreatePostParams, CreateUserParams,
    FollowsRepo, GroupsRepo, PostsRepo, PostsWriteRepo, RepoError, SessionsRepo,
    StoredCredentials, UpdatePostParams, UsersRepo,
};
use scribo::cache::FeedCache;
use scribo::domain::entities::{
    CommentRecord, FollowRecord, GroupRecord, PostRecord, SessionRecord, UserRecord,
};
use scribo::infra::http::{HttpState, build_router};
use scribo::infra::media::MediaStorage;

#[derive(Default)]
struct StoreState {
    users: Vec<(UserRecord, String, Vec<u8>)>,
    sessions: Vec<SessionRecord>,
    groups: Vec<GroupRecord>,
    posts: Vec<PostRecord>,
    comments: Vec<CommentRecord>,
    follows: Vec<FollowRecord>,
}

#[derive(Default)]
struct MemoryStore {
    inner: Mutex<StoreState>,
}

impl MemoryStore {
    fn lock(&self) -> std::sync::MutexGuard<'_, StoreState> {
        self.inner.lock().expect("store lock")
    }

    fn add_user(&self, username: &str, password: &str) -> UserRecord {
        let salt = "salt".to_string();
        let digest = hash_password(&salt, password);
        let record = UserRecord {
            id: Uuid::new_v4(),
            username: username.to_string(),
            created_at: OffsetDateTime::now_utc(),
        };
        self.lock().users.push((record.clone(), salt, digest));
        record
    }

    fn add_session(&self, user: &UserRecord) -> String {
        let token = format!("ss_test_{}", Uuid::new_v4().simple());
        self.lock().sessions.push(SessionRecord {
            token: token.clone(),
            user_id: user.id,
            created_at: OffsetDateTime::now_utc(),
        });
        token
    }

    fn add_group(&self, slug: &str, title: &str) -> GroupRecord {
        let record = GroupRecord {
            id: Uuid::new_v4(),
            slug: slug.to_string(),
            title: title.to_string(),
            description: format!("About {title}"),
            created_at: OffsetDateTime::now_utc(),
        };
        self.lock().groups.push(record.clone());
        record
    }

    fn add_post(&self, author: &UserRecord, group: Option<&GroupRecord>, text: &str) -> PostRecord {
        let mut state = self.lock();
        // Later inserts sort newer so listings stay deterministic.
        let created_at = OffsetDateTime::now_utc()
            + Duration::from_millis(state.posts.len() as u64 + 1);
        let record = PostRecord {
            id: Uuid::new_v4(),
            text: text.to_string(),
            author_id: author.id,
            author_username: author.username.clone(),
            group_id: group.map(|g| g.id),
            group_slug: group.map(|g| g.slug.clone()),
            group_title: group.map(|g| g.title.clone()),
            image_path: None,
            created_at,
        };
        state.posts.push(record.clone());
        record
    }

    fn post_count(&self) -> usize {
        self.lock().posts.len()
    }

    fn follow_count(&self) -> usize {
        self.lock().follows.len()
    }

    fn remove_post(&self, id: Uuid) {
        self.lock().posts.retain(|post| post.id != id);
    }

    fn sorted_posts<F>(&self, filter: F) -> Vec<PostRecord>
    where
        F: Fn(&PostRecord) -> bool,
    {
        let mut posts: Vec<PostRecord> = self
            .lock()
            .posts
            .iter()
            .filter(|post| filter(post))
            .cloned()
            .collect();
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        posts
    }
}

#[async_trait]
impl UsersRepo for MemoryStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, RepoError> {
        Ok(self
            .lock()
            .users
            .iter()
            .find(|(user, _, _)| user.username == username)
            .map(|(user, _, _)| user.clone()))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, RepoError> {
        Ok(self
            .lock()
            .users
            .iter()
            .find(|(user, _, _)| user.id == id)
            .map(|(user, _, _)| user.clone()))
    }

    async fn find_credentials(
        &self,
        username: &str,
    ) -> Result<Option<StoredCredentials>, RepoError> {
        Ok(self
            .lock()
            .users
            .iter()
            .find(|(user, _, _)| user.username == username)
            .map(|(user, salt, digest)| StoredCredentials {
                user: user.clone(),
                password_salt: salt.clone(),
                password_digest: digest.clone(),
            }))
    }

    async fn create_user(&self, params: CreateUserParams) -> Result<UserRecord, RepoError> {
        let record = UserRecord {
            id: Uuid::new_v4(),
            username: params.username,
            created_at: OffsetDateTime::now_utc(),
        };
        self.lock()
            .users
            .push((record.clone(), params.password_salt, params.password_digest));
        Ok(record)
    }
}

#[async_trait]
impl SessionsRepo for MemoryStore {
    async fn insert_session(&self, session: SessionRecord) -> Result<(), RepoError> {
        self.lock().sessions.push(session);
        Ok(())
    }

    async fn find_session_user(&self, token: &str) -> Result<Option<UserRecord>, RepoError> {
        let state = self.lock();
        let Some(session) = state.sessions.iter().find(|s| s.token == token) else {
            return Ok(None);
        };
        Ok(state
            .users
            .iter()
            .find(|(user, _, _)| user.id == session.user_id)
            .map(|(user, _, _)| user.clone()))
    }

    async fn delete_session(&self, token: &str) -> Result<(), RepoError> {
        self.lock().sessions.retain(|s| s.token != token);
        Ok(())
    }
}

#[async_trait]
impl GroupsRepo for MemoryStore {
    async fn find_by_slug(&self, slug: &str) -> Result<Option<GroupRecord>, RepoError> {
        Ok(self
            .lock()
            .groups
            .iter()
            .find(|group| group.slug == slug)
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<GroupRecord>, RepoError> {
        Ok(self.lock().groups.iter().find(|g| g.id == id).cloned())
    }

    async fn list_all(&self) -> Result<Vec<GroupRecord>, RepoError> {
        Ok(self.lock().groups.clone())
    }

    async fn create_group(&self, params: CreateGroupParams) -> Result<GroupRecord, RepoError> {
        let record = GroupRecord {
            id: Uuid::new_v4(),
            slug: params.slug,
            title: params.title,
            description: params.description,
            created_at: OffsetDateTime::now_utc(),
        };
        self.lock().groups.push(record.clone());
        Ok(record)
    }
}

#[async_trait]
impl PostsRepo for MemoryStore {
    async fn list_all(&self) -> Result<Vec<PostRecord>, RepoError> {
        Ok(self.sorted_posts(|_| true))
    }

    async fn count_by_group(&self, group_id: Uuid) -> Result<u64, RepoError> {
        Ok(self.sorted_posts(|p| p.group_id == Some(group_id)).len() as u64)
    }

    async fn list_by_group(
        &self,
        group_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<PostRecord>, RepoError> {
        Ok(window(
            self.sorted_posts(|p| p.group_id == Some(group_id)),
            limit,
            offset,
        ))
    }

    async fn count_by_author(&self, author_id: Uuid) -> Result<u64, RepoError> {
        Ok(self.sorted_posts(|p| p.author_id == author_id).len() as u64)
    }

    async fn list_by_author(
        &self,
        author_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<PostRecord>, RepoError> {
        Ok(window(
            self.sorted_posts(|p| p.author_id == author_id),
            limit,
            offset,
        ))
    }

    async fn count_by_authors(&self, author_ids: &[Uuid]) -> Result<u64, RepoError> {
        Ok(self
            .sorted_posts(|p| author_ids.contains(&p.author_id))
            .len() as u64)
    }

    async fn list_by_authors(
        &self,
        author_ids: &[Uuid],
        limit: i64,
        offset: i64,
    ) -> Result<Vec<PostRecord>, RepoError> {
        Ok(window(
            self.sorted_posts(|p| author_ids.contains(&p.author_id)),
            limit,
            offset,
        ))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<PostRecord>, RepoError> {
        Ok(self.lock().posts.iter().find(|p| p.id == id).cloned())
    }
}

fn window(posts: Vec<PostRecord>, limit: i64, offset: i64) -> Vec<PostRecord> {
    posts
        .into_iter()
        .skip(offset.max(0) as usize)
        .take(limit.max(0) as usize)
        .collect()
}

#[async_trait]
impl PostsWriteRepo for MemoryStore {
    async fn create_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError> {
        let mut state = self.lock();
        let author_username = state
            .users
            .iter()
            .find(|(user, _, _)| user.id == params.author_id)
            .map(|(user, _, _)| user.username.clone())
            .ok_or(RepoError::InvalidInput {
                message: "unknown author".to_string(),
            })?;
        let group = params
            .group_id
            .and_then(|id| state.groups.iter().find(|g| g.id == id).cloned());

        let created_at =
            OffsetDateTime::now_utc() + Duration::from_millis(state.posts.len() as u64 + 1);
        let record = PostRecord {
            id: Uuid::new_v4(),
            text: params.text,
            author_id: params.author_id,
            author_username,
            group_id: group.as_ref().map(|g| g.id),
            group_slug: group.as_ref().map(|g| g.slug.clone()),
            group_title: group.as_ref().map(|g| g.title.clone()),
            image_path: params.image_path,
            created_at,
        };
        state.posts.push(record.clone());
        Ok(record)
    }

    async fn update_post(&self, params: UpdatePostParams) -> Result<PostRecord, RepoError> {
        let mut state = self.lock();
        let group = params
            .group_id
            .and_then(|id| state.groups.iter().find(|g| g.id == id).cloned());
        let post = state
            .posts
            .iter_mut()
            .find(|p| p.id == params.id)
            .ok_or(RepoError::NotFound)?;

        post.text = params.text;
        post.group_id = group.as_ref().map(|g| g.id);
        post.group_slug = group.as_ref().map(|g| g.slug.clone());
        post.group_title = group.as_ref().map(|g| g.title.clone());
        if let Some(image_path) = params.new_image_path {
            post.image_path = Some(image_path);
        }
        Ok(post.clone())
    }

    async fn delete_post(&self, id: Uuid) -> Result<(), RepoError> {
        let mut state = self.lock();
        let before = state.posts.len();
        state.posts.retain(|p| p.id != id);
        if state.posts.len() == before {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl CommentsRepo for MemoryStore {
    async fn list_for_post(&self, post_id: Uuid) -> Result<Vec<CommentRecord>, RepoError> {
        let mut comments: Vec<CommentRecord> = self
            .lock()
            .comments
            .iter()
            .filter(|c| c.post_id == post_id)
            .cloned()
            .collect();
        comments.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(comments)
    }

    async fn create_comment(
        &self,
        params: CreateCommentParams,
    ) -> Result<CommentRecord, RepoError> {
        let mut state = self.lock();
        let author_username = state
            .users
            .iter()
            .find(|(user, _, _)| user.id == params.author_id)
            .map(|(user, _, _)| user.username.clone())
            .ok_or(RepoError::InvalidInput {
                message: "unknown author".to_string(),
            })?;
        let record = CommentRecord {
            id: Uuid::new_v4(),
            post_id: params.post_id,
            author_id: params.author_id,
            author_username,
            text: params.text,
            created_at: OffsetDateTime::now_utc(),
        };
        state.comments.push(record.clone());
        Ok(record)
    }
}

#[async_trait]
impl FollowsRepo for MemoryStore {
    async fn follows(&self, user_id: Uuid, author_id: Uuid) -> Result<bool, RepoError> {
        Ok(self
            .lock()
            .follows
            .iter()
            .any(|f| f.user_id == user_id && f.author_id == author_id))
    }

    async fn followed_author_ids(&self, user_id: Uuid) -> Result<Vec<Uuid>, RepoError> {
        Ok(self
            .lock()
            .follows
            .iter()
            .filter(|f| f.user_id == user_id)
            .map(|f| f.author_id)
            .collect())
    }

    async fn create_follow(
        &self,
        user_id: Uuid,
        author_id: Uuid,
    ) -> Result<FollowRecord, RepoError> {
        let record = FollowRecord {
            id: Uuid::new_v4(),
            user_id,
            author_id,
            created_at: OffsetDateTime::now_utc(),
        };
        self.lock().follows.push(record.clone());
        Ok(record)
    }

    async fn delete_follow(&self, user_id: Uuid, author_id: Uuid) -> Result<(), RepoError> {
        self.lock()
            .follows
            .retain(|f| !(f.user_id == user_id && f.author_id == author_id));
        Ok(())
    }
}

// Smallest valid 1x1 GIF, for exercising the upload path.
const TINY_GIF: &[u8] = &[
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0xff, 0xff,
    0xff, 0x00, 0x00, 0x00, 0x2c, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x02,
    0x02, 0x44, 0x01, 0x00, 0x3b,
];

struct Harness {
    store: Arc<MemoryStore>,
    state: HttpState,
    media_dir: tempfile::TempDir,
}

impl Harness {
    fn new() -> Self {
        Self::with_cache_ttl(Duration::from_secs(20))
    }

    fn with_cache_ttl(ttl: Duration) -> Self {
        let store = Arc::new(MemoryStore::default());
        let media_dir = tempfile::tempdir().expect("tempdir");
        let media = Arc::new(
            MediaStorage::new(media_dir.path().to_path_buf(), 1024 * 1024).expect("media storage"),
        );

        let cache = Arc::new(FeedCache::new(ttl));
        let feed = Arc::new(FeedService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            cache,
            10,
        ));
        let posts = Arc::new(PostService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
        ));
        let comments = Arc::new(CommentService::new(store.clone(), store.clone()));
        let follows = Arc::new(FollowService::new(store.clone(), store.clone()));
        let auth = Arc::new(AuthService::new(store.clone(), store.clone()));

        let state = HttpState {
            feed,
            posts,
            comments,
            follows,
            auth,
            media,
        };

        Self {
            store,
            state,
            media_dir,
        }
    }

    fn media_file_count(&self) -> usize {
        fn walk(dir: &std::path::Path, total: &mut usize) {
            let Ok(entries) = std::fs::read_dir(dir) else {
                return;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    walk(&path, total);
                } else {
                    *total += 1;
                }
            }
        }

        let mut total = 0;
        walk(self.media_dir.path(), &mut total);
        total
    }

    fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    async fn get(&self, path: &str) -> (StatusCode, String) {
        let response = self
            .router()
            .oneshot(
                Request::builder()
                    .uri(path)
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        read_response(response).await
    }

    async fn get_with_session(&self, path: &str, token: &str) -> (StatusCode, String) {
        let response = self
            .router()
            .oneshot(
                Request::builder()
                    .uri(path)
                    .header(header::COOKIE, format!("scribo_session={token}"))
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        read_response(response).await
    }

    async fn post_form(
        &self,
        path: &str,
        token: Option<&str>,
        body: &str,
    ) -> (StatusCode, Option<String>, String) {
        let mut builder = Request::builder()
            .method("POST")
            .uri(path)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(token) = token {
            builder = builder.header(header::COOKIE, format!("scribo_session={token}"));
        }
        let response = self
            .router()
            .oneshot(builder.body(Body::from(body.to_string())).expect("request"))
            .await
            .expect("response");

        let location = response
            .headers()
            .get(header::LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let (status, body) = read_response(response).await;
        (status, location, body)
    }

    async fn post_multipart(
        &self,
        path: &str,
        token: &str,
        fields: &[(&str, &str)],
    ) -> (StatusCode, Option<String>, String) {
        const BOUNDARY: &str = "X-SCRIBO-TEST-BOUNDARY";

        let mut body = String::new();
        for (name, value) in fields {
            body.push_str(&format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            ));
        }
        body.push_str(&format!("--{BOUNDARY}--\r\n"));

        let response = self
            .router()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(path)
                    .header(
                        header::CONTENT_TYPE,
                        format!("multipart/form-data; boundary={BOUNDARY}"),
                    )
                    .header(header::COOKIE, format!("scribo_session={token}"))
                    .body(Body::from(body))
                    .expect("request"),
            )
            .await
            .expect("response");

        let location = response
            .headers()
            .get(header::LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let (status, body) = read_response(response).await;
        (status, location, body)
    }

    async fn post_multipart_with_image(
        &self,
        path: &str,
        token: &str,
        fields: &[(&str, &str)],
        image: (&str, &[u8]),
    ) -> (StatusCode, Option<String>, String) {
        const BOUNDARY: &str = "X-SCRIBO-TEST-BOUNDARY";

        let mut body: Vec<u8> = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
        let (filename, bytes) = image;
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; \
                 filename=\"{filename}\"\r\nContent-Type: image/gif\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        let response = self
            .router()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(path)
                    .header(
                        header::CONTENT_TYPE,
                        format!("multipart/form-data; boundary={BOUNDARY}"),
                    )
                    .header(header::COOKIE, format!("scribo_session={token}"))
                    .body(Body::from(body))
                    .expect("request"),
            )
            .await
            .expect("response");

        let location = response
            .headers()
            .get(header::LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let (status, body) = read_response(response).await;
        (status, location, body)
    }
}

async fn read_response(response: axum::response::Response) -> (StatusCode, String) {
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    (status, String::from_utf8_lossy(&bytes).to_string())
}

#[tokio::test]
async fn index_renders_and_paginates_at_ten() {
    let harness = Harness::new();
    let author = harness.store.add_user("leo", "password123");
    for i in 0..12 {
        harness.store.add_post(&author, None, &format!("post number {i}"));
    }

    let (status, body) = harness.get("/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.matches("<article>").count(), 10);
    assert!(body.contains("post number 11"));
    assert!(!body.contains("post number 0</p>"));

    let (status, body) = harness.get("/?page=2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.matches("<article>").count(), 2);
    assert!(body.contains("post number 0"));
}

#[tokio::test]
async fn garbage_page_parameter_falls_back_to_first_page() {
    let harness = Harness::new();
    let author = harness.store.add_user("leo", "password123");
    harness.store.add_post(&author, None, "only post");

    let (status, body) = harness.get("/?page=banana").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("only post"));
}

#[tokio::test]
async fn out_of_range_page_clamps_to_last() {
    let harness = Harness::new();
    let author = harness.store.add_user("leo", "password123");
    for i in 0..15 {
        harness.store.add_post(&author, None, &format!("clamped {i}"));
    }

    let (status, body) = harness.get("/?page=99").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.matches("<article>").count(), 5);
}

#[tokio::test]
async fn group_feed_only_contains_that_groups_posts() {
    let harness = Harness::new();
    let author = harness.store.add_user("leo", "password123");
    let cats = harness.store.add_group("cats", "Cats");
    let dogs = harness.store.add_group("dogs", "Dogs");
    harness.store.add_post(&author, Some(&cats), "a cat tale");
    harness.store.add_post(&author, Some(&dogs), "a dog story");

    let (status, body) = harness.get("/group/cats").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("a cat tale"));
    assert!(!body.contains("a dog story"));
}

#[tokio::test]
async fn unknown_group_returns_not_found_page() {
    let harness = Harness::new();
    let (status, body) = harness.get("/group/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body.contains("Page not found"));
}

#[tokio::test]
async fn unknown_route_returns_not_found_page() {
    let harness = Harness::new();
    let (status, body) = harness.get("/definitely/not/here").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body.contains("Page not found"));
}

#[tokio::test]
async fn profile_shows_only_that_authors_posts() {
    let harness = Harness::new();
    let leo = harness.store.add_user("leo", "password123");
    let mia = harness.store.add_user("mia", "password123");
    harness.store.add_post(&leo, None, "from leo");
    harness.store.add_post(&mia, None, "from mia");

    let (status, body) = harness.get("/profile/leo").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("from leo"));
    assert!(!body.contains("from mia"));
    assert!(body.contains("1 post(s)"));
}

#[tokio::test]
async fn post_detail_lists_comments_oldest_first() {
    let harness = Harness::new();
    let author = harness.store.add_user("leo", "password123");
    let post = harness.store.add_post(&author, None, "discussed post");
    {
        let mut state = harness.store.lock();
        for (i, text) in ["first comment", "second comment"].iter().enumerate() {
            state.comments.push(CommentRecord {
                id: Uuid::new_v4(),
                post_id: post.id,
                author_id: author.id,
                author_username: author.username.clone(),
                text: text.to_string(),
                created_at: OffsetDateTime::now_utc() + Duration::from_millis(i as u64),
            });
        }
    }

    let (status, body) = harness.get(&format!("/posts/{}", post.id)).await;
    assert_eq!(status, StatusCode::OK);
    let first = body.find("first comment").expect("first comment rendered");
    let second = body.find("second comment").expect("second comment rendered");
    assert!(first < second);
    assert!(body.contains("Log in</a> to comment"));
}

#[tokio::test]
async fn create_requires_login() {
    let harness = Harness::new();
    let (status, body) = harness.get("/create").await;
    assert!(status.is_redirection(), "got {status}: {body}");
}

#[tokio::test]
async fn create_post_persists_and_redirects_to_profile() {
    let harness = Harness::new();
    let author = harness.store.add_user("leo", "password123");
    let token = harness.store.add_session(&author);
    let csrf = csrf_token_for(&token);

    let (status, location, _body) = harness
        .post_multipart(
            "/create",
            &token,
            &[
                ("csrf_token", csrf.as_str()),
                ("text", "fresh words"),
                ("group", ""),
            ],
        )
        .await;

    assert!(status.is_redirection());
    assert_eq!(location.as_deref(), Some("/profile/leo"));
    assert_eq!(harness.store.post_count(), 1);

    let posts = harness.store.sorted_posts(|_| true);
    assert_eq!(posts[0].text, "fresh words");
    assert_eq!(posts[0].author_id, author.id);
    assert_eq!(posts[0].group_id, None);
}

#[tokio::test]
async fn create_post_with_group_lands_in_group_feed() {
    let harness = Harness::new();
    let author = harness.store.add_user("leo", "password123");
    let group = harness.store.add_group("cats", "Cats");
    let token = harness.store.add_session(&author);
    let csrf = csrf_token_for(&token);

    let group_id = group.id.to_string();
    let (status, _location, _body) = harness
        .post_multipart(
            "/create",
            &token,
            &[
                ("csrf_token", csrf.as_str()),
                ("text", "grouped words"),
                ("group", group_id.as_str()),
            ],
        )
        .await;
    assert!(status.is_redirection());

    let (status, body) = harness.get("/group/cats").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("grouped words"));
}

#[tokio::test]
async fn blank_post_rerenders_form_with_error() {
    let harness = Harness::new();
    let author = harness.store.add_user("leo", "password123");
    let token = harness.store.add_session(&author);
    let csrf = csrf_token_for(&token);

    let (status, _location, body) = harness
        .post_multipart(
            "/create",
            &token,
            &[("csrf_token", csrf.as_str()), ("text", "   "), ("group", "")],
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("This field is required."));
    assert_eq!(harness.store.post_count(), 0);
}

#[tokio::test]
async fn accepted_post_keeps_its_uploaded_image() {
    let harness = Harness::new();
    let author = harness.store.add_user("leo", "password123");
    let token = harness.store.add_session(&author);
    let csrf = csrf_token_for(&token);

    let (status, _location, _body) = harness
        .post_multipart_with_image(
            "/create",
            &token,
            &[
                ("csrf_token", csrf.as_str()),
                ("text", "with a picture"),
                ("group", ""),
            ],
            ("photo.gif", TINY_GIF),
        )
        .await;

    assert!(status.is_redirection());
    assert_eq!(harness.media_file_count(), 1);
    let posts = harness.store.sorted_posts(|_| true);
    assert!(posts[0].image_path.is_some());
}

#[tokio::test]
async fn rejected_post_discards_the_uploaded_image() {
    let harness = Harness::new();
    let author = harness.store.add_user("leo", "password123");
    let token = harness.store.add_session(&author);
    let csrf = csrf_token_for(&token);

    let (status, _location, body) = harness
        .post_multipart_with_image(
            "/create",
            &token,
            &[("csrf_token", csrf.as_str()), ("text", "   "), ("group", "")],
            ("photo.gif", TINY_GIF),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("This field is required."));
    assert_eq!(harness.store.post_count(), 0);
    assert_eq!(harness.media_file_count(), 0);
}

#[tokio::test]
async fn non_author_edit_discards_the_uploaded_image() {
    let harness = Harness::new();
    let author = harness.store.add_user("leo", "password123");
    let other = harness.store.add_user("mia", "password123");
    let post = harness.store.add_post(&author, None, "original text");
    let token = harness.store.add_session(&other);
    let csrf = csrf_token_for(&token);

    let (status, location, _body) = harness
        .post_multipart_with_image(
            &format!("/posts/{}/edit", post.id),
            &token,
            &[
                ("csrf_token", csrf.as_str()),
                ("text", "hijacked"),
                ("group", ""),
            ],
            ("photo.gif", TINY_GIF),
        )
        .await;

    assert!(status.is_redirection());
    assert_eq!(
        location.as_deref(),
        Some(format!("/posts/{}", post.id).as_str())
    );
    let posts = harness.store.sorted_posts(|_| true);
    assert_eq!(posts[0].text, "original text");
    assert_eq!(harness.media_file_count(), 0);
}

#[tokio::test]
async fn csrf_mismatch_is_rejected() {
    let harness = Harness::new();
    let author = harness.store.add_user("leo", "password123");
    let post = harness.store.add_post(&author, None, "target");
    let token = harness.store.add_session(&author);

    let (status, _location, body) = harness
        .post_form(
            &format!("/posts/{}/comment", post.id),
            Some(&token),
            "csrf_token=forged&text=hello",
        )
        .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body.contains("Request rejected"));
}

#[tokio::test]
async fn comment_is_added_and_redirects_back_to_detail() {
    let harness = Harness::new();
    let author = harness.store.add_user("leo", "password123");
    let commenter = harness.store.add_user("mia", "password123");
    let post = harness.store.add_post(&author, None, "target");
    let token = harness.store.add_session(&commenter);
    let csrf = csrf_token_for(&token);

    let (status, location, _body) = harness
        .post_form(
            &format!("/posts/{}/comment", post.id),
            Some(&token),
            &format!("csrf_token={csrf}&text=nice+one"),
        )
        .await;

    assert!(status.is_redirection());
    assert_eq!(location.as_deref(), Some(format!("/posts/{}", post.id).as_str()));

    let (_, body) = harness.get(&format!("/posts/{}", post.id)).await;
    assert!(body.contains("nice one"));
}

#[tokio::test]
async fn blank_comment_redirects_without_persisting() {
    let harness = Harness::new();
    let author = harness.store.add_user("leo", "password123");
    let post = harness.store.add_post(&author, None, "target");
    let token = harness.store.add_session(&author);
    let csrf = csrf_token_for(&token);

    let (status, location, _body) = harness
        .post_form(
            &format!("/posts/{}/comment", post.id),
            Some(&token),
            &format!("csrf_token={csrf}&text=+++"),
        )
        .await;

    assert!(status.is_redirection());
    assert_eq!(location.as_deref(), Some(format!("/posts/{}", post.id).as_str()));
    assert!(harness.store.lock().comments.is_empty());
}

#[tokio::test]
async fn edit_by_non_author_redirects_to_detail() {
    let harness = Harness::new();
    let author = harness.store.add_user("leo", "password123");
    let other = harness.store.add_user("mia", "password123");
    let post = harness.store.add_post(&author, None, "original text");
    let token = harness.store.add_session(&other);

    let (status, body) = harness
        .get_with_session(&format!("/posts/{}/edit", post.id), &token)
        .await;
    assert!(status.is_redirection(), "got {status}: {body}");

    let csrf = csrf_token_for(&token);
    let (status, location, _body) = harness
        .post_multipart(
            &format!("/posts/{}/edit", post.id),
            &token,
            &[
                ("csrf_token", csrf.as_str()),
                ("text", "hijacked"),
                ("group", ""),
            ],
        )
        .await;

    assert!(status.is_redirection());
    assert_eq!(
        location.as_deref(),
        Some(format!("/posts/{}", post.id).as_str())
    );
    let posts = harness.store.sorted_posts(|_| true);
    assert_eq!(posts[0].text, "original text");
}

#[tokio::test]
async fn author_can_edit_own_post() {
    let harness = Harness::new();
    let author = harness.store.add_user("leo", "password123");
    let post = harness.store.add_post(&author, None, "original text");
    let token = harness.store.add_session(&author);
    let csrf = csrf_token_for(&token);

    let (status, location, _body) = harness
        .post_multipart(
            &format!("/posts/{}/edit", post.id),
            &token,
            &[
                ("csrf_token", csrf.as_str()),
                ("text", "revised text"),
                ("group", ""),
            ],
        )
        .await;

    assert!(status.is_redirection());
    assert_eq!(
        location.as_deref(),
        Some(format!("/posts/{}", post.id).as_str())
    );
    let posts = harness.store.sorted_posts(|_| true);
    assert_eq!(posts[0].text, "revised text");
    assert_eq!(harness.store.post_count(), 1);
}

#[tokio::test]
async fn deleted_post_stays_on_front_page_until_cache_clears() {
    let harness = Harness::with_cache_ttl(Duration::from_secs(300));
    let author = harness.store.add_user("leo", "password123");
    let post = harness.store.add_post(&author, None, "short lived");

    let (_, body) = harness.get("/").await;
    assert!(body.contains("short lived"));

    harness.store.remove_post(post.id);

    // Still served from the cached snapshot.
    let (_, body) = harness.get("/").await;
    assert!(body.contains("short lived"));

    harness.state.feed.cache().clear();
    let (_, body) = harness.get("/").await;
    assert!(!body.contains("short lived"));
}

#[tokio::test]
async fn follow_and_unfollow_update_the_follow_graph() {
    let harness = Harness::new();
    let reader = harness.store.add_user("mia", "password123");
    let _author = harness.store.add_user("leo", "password123");
    let token = harness.store.add_session(&reader);
    let csrf = csrf_token_for(&token);

    let (status, location, _body) = harness
        .post_form(
            "/profile/leo/follow",
            Some(&token),
            &format!("csrf_token={csrf}"),
        )
        .await;
    assert!(status.is_redirection());
    assert_eq!(location.as_deref(), Some("/profile/leo"));
    assert_eq!(harness.store.follow_count(), 1);

    // Following twice does not create a second record.
    let (status, _, _) = harness
        .post_form(
            "/profile/leo/follow",
            Some(&token),
            &format!("csrf_token={csrf}"),
        )
        .await;
    assert!(status.is_redirection());
    assert_eq!(harness.store.follow_count(), 1);

    let (status, _, _) = harness
        .post_form(
            "/profile/leo/unfollow",
            Some(&token),
            &format!("csrf_token={csrf}"),
        )
        .await;
    assert!(status.is_redirection());
    assert_eq!(harness.store.follow_count(), 0);
}

#[tokio::test]
async fn self_follow_is_a_silent_no_op() {
    let harness = Harness::new();
    let user = harness.store.add_user("leo", "password123");
    let token = harness.store.add_session(&user);
    let csrf = csrf_token_for(&token);

    let (status, location, _body) = harness
        .post_form(
            "/profile/leo/follow",
            Some(&token),
            &format!("csrf_token={csrf}"),
        )
        .await;

    assert!(status.is_redirection());
    assert_eq!(location.as_deref(), Some("/profile/leo"));
    assert_eq!(harness.store.follow_count(), 0);
}

#[tokio::test]
async fn follow_feed_contains_only_followed_authors() {
    let harness = Harness::new();
    let reader = harness.store.add_user("mia", "password123");
    let followed = harness.store.add_user("leo", "password123");
    let ignored = harness.store.add_user("sam", "password123");
    harness.store.add_post(&followed, None, "from followed");
    harness.store.add_post(&ignored, None, "from ignored");
    {
        let mut state = harness.store.lock();
        state.follows.push(FollowRecord {
            id: Uuid::new_v4(),
            user_id: reader.id,
            author_id: followed.id,
            created_at: OffsetDateTime::now_utc(),
        });
    }
    let token = harness.store.add_session(&reader);

    let (status, body) = harness.get_with_session("/follow", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("from followed"));
    assert!(!body.contains("from ignored"));
}

#[tokio::test]
async fn follow_feed_requires_login() {
    let harness = Harness::new();
    let (status, _body) = harness.get("/follow").await;
    assert!(status.is_redirection());
}

#[tokio::test]
async fn login_sets_session_cookie_and_honors_next() {
    let harness = Harness::new();
    harness.store.add_user("leo", "password123");

    let response = harness
        .router()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/login")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(
                    "username=leo&password=password123&next=%2Fcreate",
                ))
                .expect("request"),
        )
        .await
        .expect("response");

    assert!(response.status().is_redirection());
    assert_eq!(
        response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok()),
        Some("/create")
    );
    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .expect("session cookie");
    assert!(cookie.starts_with("scribo_session="));
}

#[tokio::test]
async fn bad_credentials_rerender_the_login_form() {
    let harness = Harness::new();
    harness.store.add_user("leo", "password123");

    let (status, _location, body) = harness
        .post_form("/auth/login", None, "username=leo&password=wrong&next=")
        .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("Invalid username or password."));
}

#[tokio::test]
async fn about_pages_render() {
    let harness = Harness::new();
    for path in ["/about/author", "/about/tech"] {
        let (status, _body) = harness.get(path).await;
        assert_eq!(status, StatusCode::OK, "{path}");
    }
}
