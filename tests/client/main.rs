//! ApiClient integration tests.

mod support;
mod optimistic;
mod invalidation;
mod concurrency;
