//! Image discovery for articles.
//!
//! Two tiers: [`extract_cheap`] runs on every feed item while it is
//! normalized, [`ImageResolver`] fetches article pages for a bounded subset
//! of articles that are still imageless. Both pass their result through
//! [`canonicalize`].

mod canonical;
mod extract;
mod page;

pub use canonical::canonicalize;
pub use extract::{extract_cheap, first_image_in_html, FeedItemView};
pub use page::{scan_page_html, ImageResolver};
