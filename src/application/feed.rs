//! Listing assembly for the four feed contexts: global, group, profile, and
//! follow-based.

use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use crate::application::pagination::{self, Page};
use crate::application::repos::{FollowsRepo, GroupsRepo, PostsRepo, RepoError, UsersRepo};
use crate::cache::FeedCache;
use crate::domain::entities::{GroupRecord, PostRecord, UserRecord};

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("unknown group")]
    UnknownGroup,
    #[error("unknown user")]
    UnknownUser,
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone)]
pub struct GroupFeed {
    pub group: GroupRecord,
    pub page: Page<PostRecord>,
}

#[derive(Debug, Clone)]
pub struct ProfileFeed {
    pub author: UserRecord,
    pub page: Page<PostRecord>,
    /// Whether the signed-in viewer follows this author. Always false for
    /// anonymous viewers and for the author's own profile.
    pub following: bool,
}

#[derive(Clone)]
pub struct FeedService {
    posts: Arc<dyn PostsRepo>,
    groups: Arc<dyn GroupsRepo>,
    users: Arc<dyn UsersRepo>,
    follows: Arc<dyn FollowsRepo>,
    cache: Arc<FeedCache>,
    page_size: u32,
}

impl FeedService {
    pub fn new(
        posts: Arc<dyn PostsRepo>,
        groups: Arc<dyn GroupsRepo>,
        users: Arc<dyn UsersRepo>,
        follows: Arc<dyn FollowsRepo>,
        cache: Arc<FeedCache>,
        page_size: u32,
    ) -> Self {
        Self {
            posts,
            groups,
            users,
            follows,
            cache,
            page_size: page_size.max(1),
        }
    }

    pub fn cache(&self) -> &FeedCache {
        &self.cache
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Global feed: the full collection is taken from the cache when fresh,
    /// refreshed from storage otherwise, and paginated in memory.
    ///
    /// The snapshot is not invalidated on writes, so a post deleted within
    /// the TTL window keeps appearing here until expiry or an explicit
    /// `cache().clear()`.
    pub async fn global_page(&self, requested: u32) -> Result<Page<PostRecord>, FeedError> {
        let collection = match self.cache.get() {
            Some(cached) => cached,
            None => {
                let fresh = self.posts.list_all().await?;
                self.cache.put(fresh.clone());
                fresh
            }
        };

        Ok(pagination::paginate_slice(
            &collection,
            requested,
            self.page_size,
        ))
    }

    pub async fn group_page(&self, slug: &str, requested: u32) -> Result<GroupFeed, FeedError> {
        let group = self
            .groups
            .find_by_slug(slug)
            .await?
            .ok_or(FeedError::UnknownGroup)?;

        let total = self.posts.count_by_group(group.id).await?;
        let window = pagination::window(total, requested, self.page_size);
        let items = self
            .posts
            .list_by_group(group.id, window.limit, window.offset)
            .await?;

        Ok(GroupFeed {
            group,
            page: pagination::page_from_window(items, window, total, self.page_size),
        })
    }

    pub async fn profile_page(
        &self,
        username: &str,
        requested: u32,
        viewer: Option<Uuid>,
    ) -> Result<ProfileFeed, FeedError> {
        let author = self
            .users
            .find_by_username(username)
            .await?
            .ok_or(FeedError::UnknownUser)?;

        let total = self.posts.count_by_author(author.id).await?;
        let window = pagination::window(total, requested, self.page_size);
        let items = self
            .posts
            .list_by_author(author.id, window.limit, window.offset)
            .await?;

        let following = match viewer {
            Some(viewer_id) if viewer_id != author.id => {
                self.follows.follows(viewer_id, author.id).await?
            }
            _ => false,
        };

        Ok(ProfileFeed {
            author,
            page: pagination::page_from_window(items, window, total, self.page_size),
            following,
        })
    }

    /// Follow feed: first collect the followed author ids, then page through
    /// posts restricted to that set. The two-step shape is deliberate; the
    /// author set is expected to stay small.
    pub async fn follow_page(
        &self,
        user_id: Uuid,
        requested: u32,
    ) -> Result<Page<PostRecord>, FeedError> {
        let author_ids = self.follows.followed_author_ids(user_id).await?;
        if author_ids.is_empty() {
            return Ok(Page::empty(self.page_size));
        }

        let total = self.posts.count_by_authors(&author_ids).await?;
        let window = pagination::window(total, requested, self.page_size);
        let items = self
            .posts
            .list_by_authors(&author_ids, window.limit, window.offset)
            .await?;

        Ok(pagination::page_from_window(
            items,
            window,
            total,
            self.page_size,
        ))
    }
}
