//! ## Helix REST client
//!
//! A small client for the parts of the [Twitch Helix API](https://dev.twitch.tv/docs/api/reference)
//! a chat bot needs: looking up users, checking follows, listing chatters,
//! and verifying that the configured room exists.
//!
//! ```rust,no_run
//! # async fn run() -> Result<(), cogbot::helix::HelixError> {
//! use cogbot::helix::Helix;
//!
//! let helix = Helix::new("client-id", "oauth:token")?;
//! let broadcaster_id = helix.verify("pajlada").await?;
//! let followers = helix.followers(&broadcaster_id).await?;
//! # Ok(())
//! # }
//! ```

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::fmt::Display;
use std::time::Duration;

pub const BASE_URL: &str = "https://api.twitch.tv/helix";

/// Maximum page size allowed by Helix.
const PAGE_SIZE: &str = "100";

pub struct Helix {
  http: reqwest::Client,
  base_url: String,
  client_id: String,
  token: Option<String>,
}

impl Helix {
  /// Create a client identified by `client_id`.
  ///
  /// `token` may carry the `oauth:` prefix used for chat. An empty token sends no `Authorization` header.
  pub fn new(client_id: impl Into<String>, token: impl AsRef<str>) -> Result<Self, HelixError> {
    let http = reqwest::Client::builder()
      .timeout(Duration::from_secs(10))
      .user_agent(concat!("cogbot/", env!("CARGO_PKG_VERSION")))
      .build()?;
    let token = token.as_ref();
    let token = token.strip_prefix("oauth:").unwrap_or(token);
    Ok(Self {
      http,
      base_url: BASE_URL.into(),
      client_id: client_id.into(),
      token: Some(token.to_owned()).filter(|token| !token.is_empty()),
    })
  }

  /// Send requests to `base_url` instead of [`BASE_URL`].
  pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
    self.base_url = base_url.into().trim_end_matches('/').to_owned();
    self
  }

  pub fn client_id(&self) -> &str {
    &self.client_id
  }

  /// `GET` any endpoint, e.g. `streams`, with the given query.
  pub async fn get(
    &self,
    endpoint: &str,
    query: &[(&str, &str)],
  ) -> Result<serde_json::Value, HelixError> {
    self.request(endpoint, query).await
  }

  async fn request<T: DeserializeOwned>(
    &self,
    endpoint: &str,
    query: &[(&str, &str)],
  ) -> Result<T, HelixError> {
    let url = format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'));
    trace!(%url, ?query, "helix request");

    let mut request = self
      .http
      .get(&url)
      .query(query)
      .header("Client-ID", &self.client_id);
    if let Some(token) = &self.token {
      request = request.bearer_auth(token);
    }

    let response = request.send().await?;
    match response.status() {
      StatusCode::UNAUTHORIZED => Err(HelixError::InvalidClientId),
      status if !status.is_success() => Err(HelixError::Status {
        status: status.as_u16(),
        body: response.text().await.unwrap_or_default(),
      }),
      _ => Ok(response.json().await?),
    }
  }

  /// Look up users by login or id. All-digit values are treated as ids.
  pub async fn users(
    &self,
    users: impl IntoIterator<Item = impl AsRef<str>>,
  ) -> Result<Vec<HelixUser>, HelixError> {
    let users = users
      .into_iter()
      .map(|user| user.as_ref().trim_start_matches('#').to_owned())
      .collect::<Vec<_>>();
    if users.is_empty() {
      return Ok(Vec::new());
    }

    let query = users
      .iter()
      .map(|user| match user.bytes().all(|b| b.is_ascii_digit()) {
        true => ("id", user.as_str()),
        false => ("login", user.as_str()),
      })
      .collect::<Vec<_>>();
    let page: Page<HelixUser> = self.request("users", &query).await?;
    Ok(page.data)
  }

  /// Check that the client id is accepted and that `channel` exists.
  ///
  /// Returns the broadcaster's user id.
  pub async fn verify(&self, channel: &str) -> Result<String, HelixError> {
    self
      .users([channel])
      .await?
      .into_iter()
      .next()
      .map(|user| user.id)
      .ok_or_else(|| HelixError::InvalidChannel(channel.to_owned()))
  }

  /// Whether `user_id` follows `broadcaster_id`.
  pub async fn follows(&self, broadcaster_id: &str, user_id: &str) -> Result<bool, HelixError> {
    let page: Page<Follower> = self
      .request(
        "users/follows",
        &[("to_id", broadcaster_id), ("from_id", user_id)],
      )
      .await?;
    Ok(page.total.map_or(!page.data.is_empty(), |total| total > 0))
  }

  /// Every follower of `broadcaster_id`, newest first.
  pub async fn followers(&self, broadcaster_id: &str) -> Result<Vec<Follower>, HelixError> {
    self
      .paginate("users/follows", &[("to_id", broadcaster_id)])
      .await
  }

  /// Everyone currently connected to the chat of `broadcaster_id`.
  ///
  /// `moderator_id` must be the broadcaster or one of their moderators,
  /// and match the user the token belongs to.
  pub async fn chatters(
    &self,
    broadcaster_id: &str,
    moderator_id: &str,
  ) -> Result<Vec<Chatter>, HelixError> {
    self
      .paginate(
        "chat/chatters",
        &[
          ("broadcaster_id", broadcaster_id),
          ("moderator_id", moderator_id),
        ],
      )
      .await
  }

  /// Collect every page of `endpoint`, following the cursor until a page comes back empty.
  async fn paginate<T: DeserializeOwned>(
    &self,
    endpoint: &str,
    query: &[(&str, &str)],
  ) -> Result<Vec<T>, HelixError> {
    let mut items = Vec::new();
    let mut cursor = None::<String>;
    loop {
      let mut page_query = query.to_vec();
      page_query.push(("first", PAGE_SIZE));
      if let Some(cursor) = cursor.as_deref() {
        page_query.push(("after", cursor));
      }
      let page: Page<T> = self.request(endpoint, &page_query).await?;
      if page.data.is_empty() {
        break;
      }
      items.extend(page.data);

      match page.pagination.cursor {
        Some(next) if !next.is_empty() => cursor = Some(next),
        _ => break,
      }
    }
    Ok(items)
  }
}

impl std::fmt::Debug for Helix {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Helix")
      .field("base_url", &self.base_url)
      .field("client_id", &self.client_id)
      .finish_non_exhaustive()
  }
}

#[derive(Deserialize)]
struct Page<T> {
  data: Vec<T>,
  #[serde(default)]
  pagination: Pagination,
  #[serde(default)]
  total: Option<u64>,
}

#[derive(Default, Deserialize)]
struct Pagination {
  cursor: Option<String>,
}

/// A user, as returned by `GET /users`.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct HelixUser {
  pub id: String,
  pub login: String,
  pub display_name: String,
  #[serde(default)]
  pub broadcaster_type: String,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub profile_image_url: String,
}

/// One follow relationship, as returned by `GET /users/follows`.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct Follower {
  pub from_id: String,
  pub from_login: String,
  pub from_name: String,
  pub followed_at: String,
}

/// A user connected to a chat, as returned by `GET /chat/chatters`.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct Chatter {
  pub user_id: String,
  pub user_login: String,
  pub user_name: String,
}

/// A failed Helix request.
#[derive(Debug)]
pub enum HelixError {
  /// The request could not be sent, or the response body was invalid.
  Http(reqwest::Error),

  /// The server rejected the client id or token.
  InvalidClientId,

  /// No such channel.
  InvalidChannel(String),

  /// The server responded with an unexpected status.
  Status { status: u16, body: String },
}

impl From<reqwest::Error> for HelixError {
  fn from(value: reqwest::Error) -> Self {
    Self::Http(value)
  }
}

impl Display for HelixError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      HelixError::Http(e) => write!(f, "helix request failed: {e}"),
      HelixError::InvalidClientId => write!(f, "helix request failed: invalid client id"),
      HelixError::InvalidChannel(channel) => {
        write!(f, "helix request failed: channel `{channel}` does not exist")
      }
      HelixError::Status { status, body } => {
        write!(f, "helix request failed: status {status}: {body}")
      }
    }
  }
}

impl std::error::Error for HelixError {
  fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
    match self {
      HelixError::Http(e) => Some(e),
      _ => None,
    }
  }
}

static_assert_send!(Helix);
static_assert_sync!(Helix);
