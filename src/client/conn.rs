use std::fmt::Display;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::rustls::client::InvalidDnsNameError;
use tokio_rustls::rustls::{ClientConfig, RootCertStore, ServerName};
use tokio_rustls::{rustls, TlsConnector};

pub const HOST: &str = "irc.chat.twitch.tv";
pub const TLS_PORT: u16 = 6697;
pub const PLAIN_PORT: u16 = 6667;

pub type BoxedRead = Box<dyn AsyncRead + Send + Unpin>;
pub type BoxedWrite = Box<dyn AsyncWrite + Send + Unpin>;

/// Where to connect to.
///
/// The [`Default`] impl is Twitch IRC over TLS.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
  pub host: String,
  pub port: u16,
  pub tls: bool,
}

impl Endpoint {
  /// Connect to `host:port` over TLS.
  pub fn tls(host: impl Into<String>, port: u16) -> Self {
    Self {
      host: host.into(),
      port,
      tls: true,
    }
  }

  /// Connect to `host:port` over plain TCP.
  pub fn plain(host: impl Into<String>, port: u16) -> Self {
    Self {
      host: host.into(),
      port,
      tls: false,
    }
  }
}

impl Default for Endpoint {
  fn default() -> Self {
    Self::tls(HOST, TLS_PORT)
  }
}

impl Display for Endpoint {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let scheme = if self.tls { "tls" } else { "tcp" };
    write!(f, "{scheme}://{}:{}", self.host, self.port)
  }
}

/// Open a connection to `endpoint`, and split it into a read and write half.
///
/// `tls` must be `Some` if the endpoint uses TLS.
pub async fn open(
  endpoint: &Endpoint,
  tls: Option<&TlsConfig>,
) -> Result<(BoxedRead, BoxedWrite), OpenStreamError> {
  trace!(%endpoint, "opening stream");
  let tcp = TcpStream::connect((endpoint.host.as_str(), endpoint.port)).await?;
  match (endpoint.tls, tls) {
    (true, Some(config)) => {
      let stream = TlsConnector::from(config.client())
        .connect(config.server_name(), tcp)
        .await?;
      Ok(split(stream))
    }
    (true, None) => Err(OpenStreamError::MissingTlsConfig),
    (false, _) => Ok(split(tcp)),
  }
}

/// Split any transport into boxed halves.
pub fn split<S>(stream: S) -> (BoxedRead, BoxedWrite)
where
  S: AsyncRead + AsyncWrite + Send + 'static,
{
  let (reader, writer) = tokio::io::split(stream);
  (Box::new(reader), Box::new(writer))
}

/// Failed to open a stream.
#[derive(Debug)]
pub enum OpenStreamError {
  /// The underlying I/O operation failed.
  Io(io::Error),

  /// The endpoint requires TLS, but no TLS config was loaded.
  MissingTlsConfig,
}

impl From<io::Error> for OpenStreamError {
  fn from(value: io::Error) -> Self {
    Self::Io(value)
  }
}

impl Display for OpenStreamError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      OpenStreamError::Io(e) => write!(f, "failed to open stream: {e}"),
      OpenStreamError::MissingTlsConfig => write!(f, "failed to open stream: no tls config"),
    }
  }
}

impl std::error::Error for OpenStreamError {}

#[derive(Debug, Clone)]
pub struct TlsConfig {
  config: Arc<ClientConfig>,
  server_name: ServerName,
}

impl TlsConfig {
  /// Load the native root certificates for connecting to `host`.
  pub fn load(host: &str) -> Result<Self, TlsConfigError> {
    let server_name = ServerName::try_from(host)?;
    trace!("loading native certificates");
    let mut root_store = RootCertStore::empty();
    for cert in rustls_native_certs::load_native_certs()? {
      root_store.add(&rustls::Certificate(cert.0))?;
    }
    let config = rustls::ClientConfig::builder()
      .with_safe_defaults()
      .with_root_certificates(root_store)
      .with_no_client_auth();
    Ok(Self {
      config: Arc::new(config),
      server_name,
    })
  }

  pub fn client(&self) -> Arc<ClientConfig> {
    self.config.clone()
  }

  pub fn server_name(&self) -> ServerName {
    self.server_name.clone()
  }
}

/// Failed to load the TLS config.
#[derive(Debug)]
pub enum TlsConfigError {
  /// The underlying I/O operation failed.
  Io(io::Error),

  /// Failed to load certificates.
  Tls(rustls::Error),

  /// The host is not a valid DNS name.
  Dns(InvalidDnsNameError),
}

impl From<io::Error> for TlsConfigError {
  fn from(value: io::Error) -> Self {
    Self::Io(value)
  }
}

impl From<rustls::Error> for TlsConfigError {
  fn from(value: rustls::Error) -> Self {
    Self::Tls(value)
  }
}

impl From<InvalidDnsNameError> for TlsConfigError {
  fn from(value: InvalidDnsNameError) -> Self {
    Self::Dns(value)
  }
}

impl Display for TlsConfigError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      TlsConfigError::Io(e) => write!(f, "tls config error: {e}"),
      TlsConfigError::Tls(e) => write!(f, "tls config error: {e}"),
      TlsConfigError::Dns(e) => write!(f, "tls config error: {e}"),
    }
  }
}

impl std::error::Error for TlsConfigError {}
