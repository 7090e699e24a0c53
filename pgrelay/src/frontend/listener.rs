//! Connection listener. Handles all client connections.

use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::signal::ctrl_c;
use tokio::sync::Notify;
use tokio::time::timeout;
use tokio::select;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::backend::databases;
use crate::config::config;
use crate::net::messages::{BackendKeyData, SslReply, Startup};
use crate::net::{self, tls, tweak, Stream};
use crate::sighup::Sighup;

use super::{comms, Client, Error};

/// Client connections listener and handler.
#[derive(Debug, Clone)]
pub struct Listener {
    addr: String,
    shutdown: Arc<Notify>,
}

impl Listener {
    /// Create new client listener.
    pub fn new(addr: impl ToString) -> Self {
        Self {
            addr: addr.to_string(),
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Listen for client connections and handle them.
    ///
    /// Returns after Ctrl-C, once clients are gone or the shutdown timeout expired.
    pub async fn listen(&mut self) -> Result<(), Error> {
        let listener = TcpListener::bind(&self.addr).await?;
        info!("pgrelay listening on {}", self.addr);

        let tracker = TaskTracker::new();
        let mut sighup = Sighup::new()?;

        loop {
            select! {
                connection = listener.accept() => {
                    let (stream, addr) = connection?;

                    tracker.spawn(async move {
                        if let Err(err) = Self::handle_client(stream, addr).await {
                            if !err.disconnect() {
                                error!("client crashed [{}]: {}", addr, err);
                            }
                        }
                    });
                }

                _ = ctrl_c() => {
                    info!("shutting down");
                    break;
                }

                _ = sighup.listen() => {
                    reload();
                }

                _ = self.shutdown.notified() => {
                    break;
                }
            }
        }

        drop(listener);
        Self::execute_shutdown(tracker).await;

        Ok(())
    }

    /// Stop accepting connections and shut down.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }

    async fn execute_shutdown(tracker: TaskTracker) {
        let shutdown_timeout = config().config.general.shutdown_timeout();

        comms::shutdown();
        tracker.close();

        info!(
            "waiting up to {:.3}s for {} clients to finish",
            shutdown_timeout.as_secs_f64(),
            tracker.len(),
        );

        if timeout(shutdown_timeout, tracker.wait()).await.is_err() {
            warn!(
                "terminating {} client connections due to shutdown timeout",
                tracker.len()
            );
        }

        databases::shutdown();
    }

    async fn handle_client(stream: TcpStream, addr: SocketAddr) -> Result<(), Error> {
        tweak(&stream)?;

        let mut stream = Stream::plain(stream);
        let tls = tls::acceptor();

        loop {
            let startup = match Startup::from_stream(&mut stream).await {
                Ok(startup) => startup,
                Err(net::Error::Io(err)) if err.kind() == ErrorKind::ConnectionReset => {
                    // TCP health checks from load balancers.
                    return Ok(());
                }
                Err(err) => return Err(err.into()),
            };

            match startup {
                Startup::Ssl => {
                    if let Some(tls) = tls.as_ref() {
                        reply(&mut stream, SslReply::Yes).await?;
                        let plain = stream.take()?;
                        let cipher = tls.accept(plain).await?;
                        stream = Stream::tls(tokio_rustls::TlsStream::Server(cipher));
                    } else {
                        reply(&mut stream, SslReply::No).await?;
                    }
                }

                Startup::GssEnc => {
                    reply(&mut stream, SslReply::No).await?;
                }

                Startup::Startup { params } => {
                    Client::spawn(stream, params, addr).await?;
                    break;
                }

                Startup::Cancel { pid, secret } => {
                    let id = BackendKeyData { pid, secret };
                    match comms::cancel(&id).await {
                        Ok(true) => info!("query cancelled for client {} [{}]", id, addr),
                        Ok(false) => debug!("nothing to cancel for client {} [{}]", id, addr),
                        Err(err) => warn!("cancel request failed [{}]: {}", addr, err),
                    }
                    break;
                }
            }
        }

        Ok(())
    }
}

/// SSLRequest and GSSENCRequest are answered with a single byte.
async fn reply(stream: &mut Stream, reply: SslReply) -> Result<(), Error> {
    stream.write_all(&[reply.byte()]).await?;
    stream.flush().await?;

    Ok(())
}

/// Reload configuration and TLS certificates after SIGHUP.
fn reload() {
    if let Err(err) = databases::reload() {
        error!("configuration reload error: {}", err);
        return;
    }

    if let Err(err) = tls::load() {
        error!("TLS reload error: {}", err);
    }
}
