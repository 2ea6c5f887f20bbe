//! Reading iCal feeds: HTTP fetch and normalization into `NormalizedEvent`s.

pub mod fetch;
pub mod normalize;

pub use fetch::{HttpFeed, feed_url};
pub use normalize::normalize;
