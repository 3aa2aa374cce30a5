//! Side-effecting collaborators: filesystem, subprocesses, network, editor.

pub mod checkpoint;
pub mod config;
pub mod editor;
pub mod image;
pub mod model;
pub mod process;
pub mod prompt;
pub mod toolchain;
pub mod transcript;

/// Value of environment variable `key`, trimmed, or `None` when unset or blank.
pub(crate) fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
