//! HTTP/1.1 transport over tokio TCP with optional rustls TLS.
//!
//! One connection per exchange with `Connection: close` framing: write the
//! request, read to end of stream, parse. Bulk submissions are infrequent and
//! long-lived relative to connection setup, so there is no pooling to keep
//! coherent across concurrent calls.
//!
//! TLS uses the platform-independent webpki root set. The
//! `verify_tls = false` mode installs a verifier that accepts any
//! certificate, mirroring the verify-off switch operators reach for with
//! self-signed lab deployments.

use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, RootCertStore, SignatureScheme};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::debug;

use async_trait::async_trait;
use bytes::Bytes;

use crate::config::ClientConfig;
use crate::error::BulkError;
use crate::transport::{ApiRequest, ApiResponse, Transport};

/// Path prefix of the bulk API, appended to the endpoint's base path.
const API_PREFIX: &str = "/api/bulk";

#[derive(Debug, Clone)]
struct Target {
    tls: bool,
    host: String,
    port: u16,
    base_path: String,
}

fn transport_err(message: impl Into<String>) -> BulkError {
    BulkError::TransportFailure {
        message: message.into(),
    }
}

fn parse_endpoint(endpoint: &str) -> Result<Target, BulkError> {
    let (tls, rest) = if let Some(rest) = endpoint.strip_prefix("https://") {
        (true, rest)
    } else if let Some(rest) = endpoint.strip_prefix("http://") {
        (false, rest)
    } else {
        return Err(BulkError::InvalidRequest {
            message: format!("endpoint must start with http:// or https://: '{endpoint}'"),
        });
    };

    let (authority, base_path) = match rest.find('/') {
        Some(idx) => (&rest[..idx], rest[idx..].trim_end_matches('/')),
        None => (rest, ""),
    };
    if authority.is_empty() {
        return Err(BulkError::InvalidRequest {
            message: format!("endpoint has no host: '{endpoint}'"),
        });
    }

    let (host, port) = match authority.rsplit_once(':') {
        Some((host, port)) => {
            let port = port.parse::<u16>().map_err(|_| BulkError::InvalidRequest {
                message: format!("invalid port in endpoint: '{endpoint}'"),
            })?;
            (host.to_string(), port)
        }
        None => (authority.to_string(), if tls { 443 } else { 80 }),
    };

    Ok(Target {
        tls,
        host,
        port,
        base_path: base_path.to_string(),
    })
}

/// Accepts any server certificate. Installed only when the caller explicitly
/// turns verification off.
#[derive(Debug)]
struct NoVerifier;

impl ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::ECDSA_NISTP521_SHA512,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ED25519,
        ]
    }
}

fn build_tls_connector(verify: bool) -> TlsConnector {
    let config = if verify {
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        rustls::ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth()
    } else {
        rustls::ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoVerifier))
            .with_no_client_auth()
    };
    TlsConnector::from(Arc::new(config))
}

/// Bearer-token-authenticated HTTP transport.
pub struct HttpTransport {
    config: ClientConfig,
    target: Target,
    tls: Option<TlsConnector>,
}

impl HttpTransport {
    /// Build a transport from client configuration.
    ///
    /// # Errors
    ///
    /// `InvalidRequest` when the endpoint URL does not parse.
    pub fn new(config: &ClientConfig) -> Result<Self, BulkError> {
        let target = parse_endpoint(&config.endpoint)?;
        let tls = target.tls.then(|| build_tls_connector(config.verify_tls));
        Ok(Self {
            config: config.clone(),
            target,
            tls,
        })
    }

    fn resolve_path(&self, path: &str) -> String {
        if path.starts_with('/') {
            // Server-rooted locator (e.g. a download URL from a job payload).
            format!("{}{}", self.target.base_path, path)
        } else {
            format!("{}{}/{}", self.target.base_path, API_PREFIX, path)
        }
    }

    fn render_head(&self, request: &ApiRequest, path: &str, body_len: Option<usize>) -> String {
        let mut head = format!(
            "{} {} HTTP/1.1\r\n\
             Host: {}\r\n\
             Authorization: Bearer {}\r\n\
             User-Agent: {}\r\n\
             Accept: application/json\r\n\
             Connection: close\r\n",
            request.method, path, self.target.host, self.config.token, self.config.user_agent,
        );
        if let (Some(len), Some(body)) = (body_len, &request.body) {
            head.push_str(&format!(
                "Content-Type: {}\r\nContent-Length: {len}\r\n",
                body.content_type()
            ));
        }
        head.push_str("\r\n");
        head
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, BulkError> {
        let path = self.resolve_path(&request.path);
        let body = request.body.as_ref().map(|b| b.to_bytes());
        let head = self.render_head(&request, &path, body.as_ref().map(Vec::len));
        debug!(method = %request.method, path, "http exchange");

        let addr = (self.target.host.as_str(), self.target.port);
        let tcp = tokio::time::timeout(self.config.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| {
                transport_err(format!(
                    "connect to {}:{} timed out",
                    self.target.host, self.target.port
                ))
            })?
            .map_err(|e| {
                transport_err(format!(
                    "connect to {}:{} failed: {e}",
                    self.target.host, self.target.port
                ))
            })?;

        let raw = match &self.tls {
            Some(connector) => {
                let server_name = ServerName::try_from(self.target.host.clone())
                    .map_err(|e| transport_err(format!("invalid TLS server name: {e}")))?;
                let mut stream = connector
                    .connect(server_name, tcp)
                    .await
                    .map_err(|e| transport_err(format!("TLS handshake failed: {e}")))?;
                exchange(&mut stream, head.as_bytes(), body.as_deref()).await?
            }
            None => {
                let mut stream = tcp;
                exchange(&mut stream, head.as_bytes(), body.as_deref()).await?
            }
        };

        parse_response(&raw)
    }
}

async fn exchange<S>(stream: &mut S, head: &[u8], body: Option<&[u8]>) -> Result<Vec<u8>, BulkError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream
        .write_all(head)
        .await
        .map_err(|e| transport_err(format!("failed to send request head: {e}")))?;
    if let Some(body) = body {
        stream
            .write_all(body)
            .await
            .map_err(|e| transport_err(format!("failed to send request body: {e}")))?;
    }
    stream
        .flush()
        .await
        .map_err(|e| transport_err(format!("failed to flush request: {e}")))?;

    let mut raw = Vec::new();
    stream
        .read_to_end(&mut raw)
        .await
        .map_err(|e| transport_err(format!("failed to read response: {e}")))?;
    Ok(raw)
}

/// Parse a full HTTP/1.1 response held in memory.
fn parse_response(raw: &[u8]) -> Result<ApiResponse, BulkError> {
    let head_end = find_header_end(raw)
        .ok_or_else(|| transport_err("response has no header terminator"))?;
    let head = std::str::from_utf8(&raw[..head_end])
        .map_err(|_| transport_err("response head is not UTF-8"))?;
    let mut lines = head.split("\r\n");

    let status_line = lines
        .next()
        .ok_or_else(|| transport_err("empty response"))?;
    let status = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse::<u16>().ok())
        .ok_or_else(|| transport_err(format!("malformed status line: '{status_line}'")))?;

    let mut headers = Vec::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| transport_err(format!("malformed header line: '{line}'")))?;
        headers.push((name.trim().to_string(), value.trim().to_string()));
    }

    let rest = &raw[head_end + 4..];
    let content_length = headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.parse::<usize>().ok());
    let chunked = headers
        .iter()
        .any(|(n, v)| n.eq_ignore_ascii_case("transfer-encoding") && v.contains("chunked"));

    let body = if chunked {
        decode_chunked(rest)?
    } else if let Some(len) = content_length {
        if rest.len() < len {
            return Err(transport_err(format!(
                "response body truncated: expected {len} bytes, got {}",
                rest.len()
            )));
        }
        rest[..len].to_vec()
    } else {
        rest.to_vec()
    };

    Ok(ApiResponse {
        status,
        headers,
        body: Bytes::from(body),
    })
}

fn find_header_end(raw: &[u8]) -> Option<usize> {
    raw.windows(4).position(|w| w == b"\r\n\r\n")
}

fn decode_chunked(mut rest: &[u8]) -> Result<Vec<u8>, BulkError> {
    let mut body = Vec::new();
    loop {
        let line_end = rest
            .windows(2)
            .position(|w| w == b"\r\n")
            .ok_or_else(|| transport_err("chunked body missing size line"))?;
        let size_line = std::str::from_utf8(&rest[..line_end])
            .map_err(|_| transport_err("chunk size line is not UTF-8"))?;
        let size = usize::from_str_radix(size_line.trim().split(';').next().unwrap_or(""), 16)
            .map_err(|_| transport_err(format!("invalid chunk size: '{size_line}'")))?;
        rest = &rest[line_end + 2..];
        if size == 0 {
            return Ok(body);
        }
        if rest.len() < size + 2 {
            return Err(transport_err("chunked body truncated"));
        }
        body.extend_from_slice(&rest[..size]);
        rest = &rest[size + 2..];
    }
}
