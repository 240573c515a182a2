//! Concrete source adapters

mod feed;

pub use feed::FeedSource;
