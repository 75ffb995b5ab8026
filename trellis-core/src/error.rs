//! Error types.
//!
//! Errors here are invariant violations: programmer mistakes that are reported
//! immediately and never retried. Host adapter calls are infallible at this
//! layer, so there is no host error variant.

use thiserror::Error;

use crate::graph::ContainerId;
use crate::reactive::SubscriberId;

/// Errors raised by the reactive layer.
#[derive(Debug, Error)]
pub enum ReactiveError {
    /// `trigger` (or a wrapper access) addressed a container that is not live.
    #[error("container {0} is not a live reactive container")]
    UnknownContainer(ContainerId),

    /// An effect was stopped twice.
    #[error("effect {0:?} has already been stopped")]
    AlreadyStopped(SubscriberId),

    /// Only objects and arrays can be wrapped.
    #[error("cannot wrap a non-structured value ({0})")]
    NotStructured(&'static str),

    /// Indexed write past the end of an array container.
    #[error("index {index} is out of bounds for an array of length {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    /// A field key was used on an array, or an index on an object.
    #[error("key `{key}` cannot address a {kind} container")]
    KeyMismatch { key: String, kind: &'static str },
}

/// Errors raised by the reconciler and component runtime.
#[derive(Debug, Error)]
pub enum RenderError {
    /// A vnode that should already be mounted has no host handle.
    #[error("{0} vnode has no mounted host handle")]
    MissingHandle(&'static str),

    /// A component definition has neither a render function nor a setup
    /// that returned one.
    #[error("component `{0}` has no render function")]
    MissingRender(String),

    /// A scheduled update ran after the renderer was dropped.
    #[error("renderer has been dropped")]
    RendererDropped,
}

/// Crate-level error.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Reactive(#[from] ReactiveError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("invalid runtime configuration: {0}")]
    Config(#[from] serde_json::Error),
}

/// Crate-level result alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_render_readable_messages() {
        let err = ReactiveError::IndexOutOfBounds { index: 4, len: 2 };
        assert_eq!(
            err.to_string(),
            "index 4 is out of bounds for an array of length 2"
        );

        let err: Error = RenderError::MissingRender("Counter".into()).into();
        assert_eq!(err.to_string(), "component `Counter` has no render function");
    }
}
