pub mod client;
pub mod pagination;
pub mod throttle;

pub use client::{mirror_url, Envelope, FetchClient, FetchRequest, MirrorFn};
pub use pagination::{collect_pages, pages, PageCursor, Pager};
pub use throttle::Throttle;
