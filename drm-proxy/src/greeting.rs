//! Static greeting listener
//!
//! Answers every request with a fixed greeting and the proxy's CORS headers.
//! Players use it to check reachability and, over TLS, to accept the
//! certificate before making license requests.

use axum::Router;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use std::future::Future;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tower::ServiceExt;
use tracing::{debug, error, info};

use crate::config::GreetingConfig;
use crate::error::Result;
use crate::server::with_cors;
use crate::tls::TlsManager;

pub const GREETING: &str = "hello world\n";

/// Greeting server
pub struct GreetingServer {
    config: GreetingConfig,
    tls_acceptor: Option<TlsAcceptor>,
}

impl GreetingServer {
    pub fn new(config: GreetingConfig) -> Result<Self> {
        let tls_acceptor = match config.tls {
            Some(ref tls_config) => Some(TlsManager::new(tls_config.clone()).build_acceptor()?),
            None => None,
        };

        Ok(Self {
            config,
            tls_acceptor,
        })
    }

    pub fn router() -> Router {
        with_cors(Router::new().fallback(greeting))
    }

    /// Bind the configured address and serve until `shutdown` resolves
    pub async fn run<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(&self.config.listen_addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        match self.tls_acceptor {
            Some(ref acceptor) => {
                info!("Starting greeting server on {} (TLS)", addr);
                serve_tls(listener, acceptor.clone(), shutdown).await
            }
            None => {
                info!("Starting greeting server on {}", addr);
                axum::serve(listener, Self::router())
                    .with_graceful_shutdown(shutdown)
                    .await?;
                Ok(())
            }
        }
    }
}

async fn greeting() -> &'static str {
    GREETING
}

async fn serve_tls<F>(listener: TcpListener, acceptor: TlsAcceptor, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let router = GreetingServer::router();
    tokio::pin!(shutdown);

    loop {
        let (stream, addr) = tokio::select! {
            _ = &mut shutdown => break,
            accepted = listener.accept() => accepted?,
        };
        let acceptor = acceptor.clone();
        let router = router.clone();

        tokio::spawn(async move {
            let tls_stream = match acceptor.accept(stream).await {
                Ok(tls_stream) => tls_stream,
                Err(e) => {
                    debug!("TLS handshake failed from {}: {}", addr, e);
                    return;
                }
            };

            let service = service_fn(move |req| router.clone().oneshot(req));
            if let Err(e) = hyper_util::server::conn::auto::Builder::new(TokioExecutor::new())
                .serve_connection(TokioIo::new(tls_stream), service)
                .await
            {
                error!("Error serving greeting connection from {}: {}", addr, e);
            }
        });
    }

    info!("Greeting server stopped");
    Ok(())
}
