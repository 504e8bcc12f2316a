use tracing::{info, warn};

/// Opens `url` in the desktop's default browser without waiting for it. Failure is
/// logged and otherwise ignored; the share keeps running either way.
pub fn open_status_page(url: &str) {
    match open::that_detached(url) {
        Ok(()) => info!(url, "opened status page in browser"),
        Err(err) => warn!(url, error = %err, "failed to open browser; open the URL manually"),
    }
}
