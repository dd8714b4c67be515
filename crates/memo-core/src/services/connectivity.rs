//! Reachability probe for the remote catalog.

use tracing::{debug, warn};

use super::OrthancClient;

/// Cheap reachability check: one GET against a listing endpoint.
#[derive(Clone)]
pub struct ConnectivityProbe {
    client: OrthancClient,
    path: String,
}

impl ConnectivityProbe {
    pub fn new(client: OrthancClient, path: impl Into<String>) -> Self {
        Self {
            client,
            path: path.into(),
        }
    }

    /// Whether the server answered the probe with a success status.
    ///
    /// Never fails: every transport or status error collapses to `false`.
    pub async fn is_reachable(&self) -> bool {
        match self.client.ping(&self.path).await {
            Ok(()) => {
                debug!(url = %self.client.base_url(), "Orthanc reachable");
                true
            }
            Err(e) => {
                warn!(url = %self.client.base_url(), error = %e, "Orthanc unreachable");
                false
            }
        }
    }
}
