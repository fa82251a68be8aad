//! Support for setting up RusTLS in a consistent fashion.

use rustls::{ClientConfig, RootCertStore};
use rustls_native_certs::load_native_certs;

use crate::common::*;

/// Standard RusTLS `ClientConfig` setup, trusting the platform's root
/// certificates.
pub(crate) fn rustls_client_config() -> Result<ClientConfig> {
    let mut root_store = RootCertStore::empty();
    let cert_result = load_native_certs();
    let (added, ignored) = root_store.add_parsable_certificates(cert_result.certs);
    trace!("loaded {} native certs, ignored {}", added, ignored);
    // Some platforms have a few unreadable certificates lying around. That
    // only matters if it leaves us with nothing to trust.
    for err in &cert_result.errors {
        if root_store.is_empty() {
            warn!("error loading native certs: {}", err);
        } else {
            trace!("ignoring error loading native certs: {}", err);
        }
    }

    Ok(ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth())
}
