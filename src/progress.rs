//! Observer trait for workflow events.
//!
//! Inject an [`Arc<dyn WorkflowObserver>`] via
//! [`crate::config::RecomposeConfigBuilder::observer`] to hear about step
//! changes while a long remote call is in flight. A terminal spinner, a
//! WebSocket push, or a test recorder can all sit behind this trait without the
//! controller knowing how the host renders anything.
//!
//! # Example
//!
//! ```rust
//! use edgequake_recompose::{RecomposeConfig, Step, WorkflowObserver};
//! use std::sync::{Arc, Mutex};
//!
//! #[derive(Default)]
//! struct StepLog(Mutex<Vec<Step>>);
//!
//! impl WorkflowObserver for StepLog {
//!     fn on_step_change(&self, _from: Step, to: Step) {
//!         self.0.lock().unwrap().push(to);
//!     }
//! }
//!
//! let config = RecomposeConfig::builder()
//!     .observer(Arc::new(StepLog::default()))
//!     .build()
//!     .unwrap();
//! ```

use crate::session::Step;
use std::sync::Arc;

/// Called by the workflow controller as the session moves between steps.
///
/// All methods have default no-op implementations so observers only override
/// what they care about.
pub trait WorkflowObserver: Send + Sync {
    /// The session moved from `from` to `to`. Not called for self-transitions.
    fn on_step_change(&self, from: Step, to: Step) {
        let _ = (from, to);
    }

    /// A collaborator failed and `message` was stored as the session error.
    fn on_error(&self, message: &str) {
        let _ = message;
    }

    /// Analysis failed and the fallback element set was substituted.
    fn on_analysis_fallback(&self, reason: &str) {
        let _ = reason;
    }

    /// Analysis finished with `count` elements.
    fn on_elements_ready(&self, count: usize) {
        let _ = count;
    }
}

/// A no-op observer. Used when none is configured.
pub struct NoopObserver;

impl WorkflowObserver for NoopObserver {}

/// Convenience alias matching the type stored in [`crate::config::RecomposeConfig`].
pub type SharedObserver = Arc<dyn WorkflowObserver>;
