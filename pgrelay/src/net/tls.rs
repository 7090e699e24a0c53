//! TLS for client connections.

use std::path::Path;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tokio_rustls::rustls::{
    self,
    pki_types::{pem::PemObject, CertificateDer, PrivateKeyDer},
};
use tokio_rustls::TlsAcceptor;
use tracing::{debug, info};

use crate::config::config;

use super::Error;

static ACCEPTOR: ArcSwapOption<TlsAcceptor> = ArcSwapOption::const_empty();

/// TLS acceptor, if TLS is configured.
pub fn acceptor() -> Option<Arc<TlsAcceptor>> {
    ACCEPTOR.load_full()
}

/// Build the acceptor from the current configuration.
pub fn load() -> Result<(), Error> {
    debug!("loading TLS configuration");

    let config = config();

    match config.config.general.tls() {
        Some((cert, key)) => {
            let acceptor = build_acceptor(cert, key)?;
            let previous = ACCEPTOR.swap(Some(Arc::new(acceptor)));
            if previous.is_none() {
                info!(cert = %cert.display(), "TLS enabled");
            } else {
                info!(cert = %cert.display(), "TLS certificate reloaded");
            }
        }
        None => {
            if ACCEPTOR.swap(None).is_some() {
                info!("TLS disabled");
            }
        }
    }

    Ok(())
}

fn build_acceptor(cert: &Path, key: &Path) -> Result<TlsAcceptor, Error> {
    let certs = CertificateDer::pem_file_iter(cert)?.collect::<Result<Vec<_>, _>>()?;
    let key = PrivateKeyDer::from_pem_file(key)?;

    let config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}
