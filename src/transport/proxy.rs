//! HTTP `CONNECT` tunnelling for proxied gateway connections.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use bytes::Bytes;
use http_body_util::Empty;
use hyper::{
    Method,
    Request,
    StatusCode,
    client::conn::http1,
    header::{HOST, PROXY_AUTHORIZATION},
    upgrade::Upgraded,
};
use hyper_util::rt::TokioIo;
use log::debug;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
};

use super::{ProxyConfig, TransportError};

/// Byte stream carried through an established tunnel.
pub(super) type Tunnel = TokioIo<Upgraded>;

/// Open a TCP tunnel to `target` (`host:port`) through `proxy`.
pub(super) async fn open_tunnel(proxy: &ProxyConfig, target: &str) -> Result<Tunnel, TransportError> {
    let authority = proxy.authority();
    let stream = TcpStream::connect(&authority)
        .await
        .map_err(|e| TransportError::Connect {
            url: authority.clone(),
            reason: e.to_string(),
        })?;
    let tunnel = handshake(stream, proxy, target).await?;
    debug!("proxy tunnel established: proxy={authority}, target={target}");
    Ok(tunnel)
}

/// `Proxy-Authorization` value for the proxy's credentials, if any.
fn authorization(proxy: &ProxyConfig) -> Option<String> {
    proxy.credentials().map(|credentials| {
        let token = STANDARD.encode(format!("{}:{}", credentials.username, credentials.password));
        format!("Basic {token}")
    })
}

/// Send `CONNECT` over `stream` and upgrade to the tunnel once the proxy
/// accepts it.
async fn handshake<S>(stream: S, proxy: &ProxyConfig, target: &str) -> Result<Tunnel, TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let connect_error = |reason: String| TransportError::Connect {
        url: target.to_owned(),
        reason,
    };

    let (mut sender, connection) = http1::Builder::new()
        .title_case_headers(true)
        .handshake::<_, Empty<Bytes>>(TokioIo::new(stream))
        .await
        .map_err(|e| connect_error(e.to_string()))?;
    tokio::spawn(async move {
        if let Err(e) = connection.with_upgrades().await {
            debug!("proxy connection ended: {e}");
        }
    });

    let mut request = Request::builder()
        .method(Method::CONNECT)
        .uri(target)
        .header(HOST, target);
    if let Some(value) = authorization(proxy) {
        request = request.header(PROXY_AUTHORIZATION, value);
    }
    let request = request
        .body(Empty::new())
        .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;

    let response = sender
        .send_request(request)
        .await
        .map_err(|e| connect_error(e.to_string()))?;
    match response.status() {
        StatusCode::OK => {}
        StatusCode::PROXY_AUTHENTICATION_REQUIRED => {
            return Err(TransportError::InvalidRequest(format!(
                "proxy rejected credentials for {target}"
            )));
        }
        status => return Err(connect_error(format!("proxy refused tunnel: {status}"))),
    }

    let upgraded = hyper::upgrade::on(response)
        .await
        .map_err(|e| connect_error(e.to_string()))?;
    Ok(TokioIo::new(upgraded))
}
