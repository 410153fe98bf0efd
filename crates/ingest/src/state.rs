use std::sync::Arc;

use attest_db::StatusStore;

use crate::service::ReceiptService;

/// Shared application state available to all Axum handlers via
/// `State<AppState>`. Cheaply cloneable.
#[derive(Clone)]
pub struct AppState {
    /// Receipt service (validation, fingerprinting, batch hand-off).
    pub service: Arc<ReceiptService>,
    /// State store, used by the health endpoint.
    pub store: Arc<dyn StatusStore>,
}
