//! Feed caching.
//!
//! A single-slot cache for the global feed: the full unfiltered post
//! collection is stored under one fixed key with a short TTL (20 seconds by
//! default) and pagination is applied to the cached collection in memory.
//!
//! Writes do not invalidate the slot early. A deleted post stays visible in
//! the global listing until the entry expires or `clear` is called; callers
//! relying on the listing must tolerate that staleness window.

mod store;

pub use store::FeedCache;
