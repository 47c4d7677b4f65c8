// ABOUTME: API backend implementations.
// ABOUTME: HTTP for real traffic, mock for deterministic tests.

pub mod http;
pub mod mock;
