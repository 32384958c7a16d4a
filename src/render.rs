//! View configuration for a query host.
//!
//! A host either delegates everything to one render function, or picks among
//! success, error and loading views depending on the execution outcome.

use crate::error::ExecutionError;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Props passed to views
pub type Props = Map<String, Value>;

/// State of the current execution
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Outcome {
    #[default]
    Loading,
    Success(Props),
    Failed(ExecutionError),
}

impl Outcome {
    pub fn is_loading(&self) -> bool {
        matches!(self, Outcome::Loading)
    }

    pub fn error(&self) -> Option<&ExecutionError> {
        match self {
            Outcome::Failed(err) => Some(err),
            _ => None,
        }
    }

    pub fn payload(&self) -> Option<&Props> {
        match self {
            Outcome::Success(props) => Some(props),
            _ => None,
        }
    }
}

/// Restarts the owning host's execution with the same environment and query
#[derive(Clone)]
pub struct RetryHandle(Arc<dyn Fn() + Send + Sync>);

impl RetryHandle {
    pub fn new(retry: impl Fn() + Send + Sync + 'static) -> Self {
        Self(Arc::new(retry))
    }

    pub fn retry(&self) {
        (self.0)()
    }
}

impl fmt::Debug for RetryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RetryHandle")
    }
}

/// Arguments to a unified render function
#[derive(Debug)]
pub struct RenderArgs<'a> {
    pub error: Option<&'a ExecutionError>,
    /// Host props overlaid with the payload, if one has arrived
    pub props: Props,
    pub loading: bool,
}

/// Arguments to an error view
#[derive(Debug)]
pub struct ErrorArgs<'a> {
    pub error: &'a ExecutionError,
    pub retry: RetryHandle,
    pub props: &'a Props,
}

pub type RenderFn<V> = Arc<dyn Fn(RenderArgs<'_>) -> Option<V> + Send + Sync>;
pub type SuccessView<V> = Arc<dyn Fn(&Props) -> V + Send + Sync>;
pub type ErrorView<V> = Arc<dyn Fn(ErrorArgs<'_>) -> V + Send + Sync>;
pub type LoadingView<V> = Arc<dyn Fn(&Props) -> V + Send + Sync>;

/// Which views to render and the host's own props
pub struct RenderSpec<V> {
    render: Option<RenderFn<V>>,
    success: Option<SuccessView<V>>,
    error: Option<ErrorView<V>>,
    loading: Option<LoadingView<V>>,
    props: Props,
}

impl<V> Default for RenderSpec<V> {
    fn default() -> Self {
        Self {
            render: None,
            success: None,
            error: None,
            loading: None,
            props: Props::new(),
        }
    }
}

impl<V> fmt::Debug for RenderSpec<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderSpec")
            .field("render", &self.render.is_some())
            .field("success", &self.success.is_some())
            .field("error", &self.error.is_some())
            .field("loading", &self.loading.is_some())
            .field("props", &self.props)
            .finish()
    }
}

impl<V> RenderSpec<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_render(
        mut self,
        render: impl Fn(RenderArgs<'_>) -> Option<V> + Send + Sync + 'static,
    ) -> Self {
        self.render = Some(Arc::new(render));
        self
    }

    pub fn with_success(mut self, view: impl Fn(&Props) -> V + Send + Sync + 'static) -> Self {
        self.success = Some(Arc::new(view));
        self
    }

    pub fn with_error(
        mut self,
        view: impl Fn(ErrorArgs<'_>) -> V + Send + Sync + 'static,
    ) -> Self {
        self.error = Some(Arc::new(view));
        self
    }

    pub fn with_loading(mut self, view: impl Fn(&Props) -> V + Send + Sync + 'static) -> Self {
        self.loading = Some(Arc::new(view));
        self
    }

    pub fn with_prop(mut self, key: impl Into<String>, value: Value) -> Self {
        self.props.insert(key.into(), value);
        self
    }

    pub fn with_props(mut self, props: Props) -> Self {
        self.props = props;
        self
    }

    pub fn props(&self) -> &Props {
        &self.props
    }

    /// A render function alongside any other view. The render function wins;
    /// the other views are never used.
    pub fn has_conflict(&self) -> bool {
        self.render.is_some()
            && (self.success.is_some() || self.error.is_some() || self.loading.is_some())
    }

    /// Pick and render the view for `outcome`.
    ///
    /// Precedence: render function, then error view, then nothing for an
    /// unhandled error, then success view, then loading view.
    pub fn select(&self, outcome: &Outcome, retry: &RetryHandle) -> Option<V> {
        if let Some(render) = &self.render {
            return render(RenderArgs {
                error: outcome.error(),
                props: self.merged(outcome.payload()),
                loading: outcome.is_loading(),
            });
        }

        match outcome {
            Outcome::Failed(error) => match &self.error {
                Some(view) => Some(view(ErrorArgs {
                    error,
                    retry: retry.clone(),
                    props: &self.props,
                })),
                None => {
                    debug!(error = %error, "No error view, rendering nothing");
                    None
                }
            },
            Outcome::Success(payload) => self
                .success
                .as_ref()
                .map(|view| view(&self.merged(Some(payload)))),
            Outcome::Loading => self.loading.as_ref().map(|view| view(&self.props)),
        }
    }

    fn merged(&self, payload: Option<&Props>) -> Props {
        let mut merged = self.props.clone();
        if let Some(payload) = payload {
            for (key, value) in payload {
                merged.insert(key.clone(), value.clone());
            }
        }
        merged
    }
}
