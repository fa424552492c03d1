//! HTTP/1.1 front end for the edge proxy

use crate::error::Result;
use crate::models::EdgeResponse;
use crate::proxy::EdgeProxy;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

/// Accept loop serving one task per connection
pub struct EdgeServer {
    proxy: Arc<EdgeProxy>,
    listener: TcpListener,
}

impl EdgeServer {
    /// Bind the listening socket
    pub async fn bind(proxy: Arc<EdgeProxy>, addr: SocketAddr) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(EdgeServer { proxy, listener })
    }

    /// Address actually bound (useful with port 0)
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve connections until `shutdown` resolves
    ///
    /// Connections already accepted keep running on their own tasks.
    pub async fn serve<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        info!("Edge server listening on http://{}", self.local_addr()?);
        tokio::pin!(shutdown);

        loop {
            let (stream, peer) = tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        continue;
                    }
                },
                _ = &mut shutdown => {
                    info!("Edge server stopped accepting connections");
                    return Ok(());
                }
            };

            debug!("Accepted connection from {}", peer);
            let io = TokioIo::new(stream);
            let proxy = Arc::clone(&self.proxy);

            tokio::task::spawn(async move {
                let service = service_fn(move |req| {
                    let proxy = Arc::clone(&proxy);
                    async move { handle_request(proxy, req).await }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    debug!("Error serving connection from {}: {:?}", peer, err);
                }
            });
        }
    }
}

async fn handle_request<B>(
    proxy: Arc<EdgeProxy>,
    req: Request<B>,
) -> std::result::Result<Response<Full<Bytes>>, Infallible> {
    let (parts, _body) = req.into_parts();
    let response = proxy
        .handle(
            &parts.method,
            parts.uri.path(),
            parts.uri.query(),
            &parts.headers,
        )
        .await;
    Ok(into_http_response(response))
}

/// Convert an [`EdgeResponse`] into a hyper response
pub fn into_http_response(response: EdgeResponse) -> Response<Full<Bytes>> {
    let EdgeResponse {
        status,
        headers,
        body,
    } = response;

    let mut http_response = Response::new(Full::new(body));
    *http_response.status_mut() = status;
    *http_response.headers_mut() = headers;
    http_response
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{HeaderMap, HeaderValue, StatusCode};

    #[test]
    fn test_into_http_response_keeps_status_and_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("etag", HeaderValue::from_static("\"a\""));
        let body = Bytes::from_static(b"xy");
        let response = EdgeResponse::new(StatusCode::PARTIAL_CONTENT, headers, body);

        let http_response = into_http_response(response);
        assert_eq!(http_response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(http_response.headers().get("etag").unwrap(), "\"a\"");
    }
}
