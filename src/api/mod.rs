//! HTTP/JSON control surface.
//!
//! Stateless: every endpoint is a thin translation from a form parameter
//! to a store call and back to JSON. Handler errors (a blob that cannot be
//! decompressed, a message that does not parse) surface as 500.

mod codec;
mod mailbox;
mod message;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use futures::stream::{FuturesUnordered, StreamExt};
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1 as http;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::api::codec::HttpResponse;
use crate::config::HttpConfig;
use crate::storage::Store;

pub struct ApiServer {
    bind_addr: SocketAddr,
    store: Arc<Store>,
}

impl ApiServer {
    pub fn new(config: HttpConfig, store: Arc<Store>) -> Arc<Self> {
        Arc::new(Self {
            bind_addr: config.bind_addr,
            store,
        })
    }

    pub async fn run(self: Arc<Self>, mut must_exit: watch::Receiver<bool>) -> Result<()> {
        let tcp = TcpListener::bind(self.bind_addr).await?;
        tracing::info!("HTTP API server listening on {:#}", self.bind_addr);

        let mut connections = FuturesUnordered::new();
        while !*must_exit.borrow() {
            let wait_conn_finished = async {
                if connections.is_empty() {
                    futures::future::pending().await
                } else {
                    connections.next().await
                }
            };
            let (socket, remote_addr) = tokio::select! {
                a = tcp.accept() => a?,
                _ = wait_conn_finished => continue,
                _ = must_exit.changed() => continue,
            };
            tracing::debug!("accepted HTTP connection from {}", remote_addr);

            let store = self.store.clone();
            let conn = tokio::spawn(async move {
                let served = http::Builder::new()
                    .serve_connection(
                        TokioIo::new(socket),
                        service_fn(move |req: Request<Incoming>| {
                            let store = store.clone();
                            async move {
                                tracing::debug!("{:?} {:?}", req.method(), req.uri());
                                match route(store, req).await {
                                    Ok(v) => Ok(v),
                                    Err(e) => {
                                        tracing::error!(err = ?e, "internal error");
                                        Response::builder()
                                            .status(StatusCode::INTERNAL_SERVER_ERROR)
                                            .body(Full::new(Bytes::new()))
                                    }
                                }
                            }
                        }),
                    )
                    .await;
                match served {
                    Err(e) => tracing::warn!(err = ?e, "connection failed"),
                    Ok(()) => tracing::trace!("connection terminated with success"),
                }
            });
            connections.push(conn);
        }
        drop(tcp);

        tracing::info!("HTTP API server shutting down, draining remaining connections...");
        while connections.next().await.is_some() {}

        Ok(())
    }
}

async fn route(store: Arc<Store>, req: Request<Incoming>) -> Result<HttpResponse> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    match (method, path.as_str()) {
        (Method::POST, "/api/mailboxes/delete") => mailbox::delete(req, &store).await,
        (_, "/api/mailboxes/delete") => codec::empty(StatusCode::METHOD_NOT_ALLOWED),

        (_, "/api/mailboxes/list") => mailbox::list(&store).await,

        (Method::POST, "/api/messages/delete") => message::delete(req, &store).await,
        (_, "/api/messages/delete") => codec::empty(StatusCode::METHOD_NOT_ALLOWED),

        (_, "/api/messages/list") => message::list(req, &store).await,
        (_, "/api/messages/details") => message::details(req, &store).await,

        _ => codec::empty(StatusCode::NOT_FOUND),
    }
}
