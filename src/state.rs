//! Shared application state for all routes.

use crate::adaptor::ResourceAdaptor;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub adaptor: Arc<ResourceAdaptor>,
    /// Origin used in pagination links; `http://{Host}` of the request when unset.
    pub public_url: Option<String>,
}
