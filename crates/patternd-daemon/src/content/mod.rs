//! Content resolution: turning raw request input into generator input.

pub mod fetch;
pub mod resolver;

pub use fetch::{FetchedPage, Fetcher, HttpFetcher};
pub use resolver::{ContentResolver, ContentSource};
