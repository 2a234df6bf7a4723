//! [`Notifier`] over the Firebase Cloud Messaging legacy HTTP send endpoint.

use pricewatch_core::provider::{Notifier, NotifierError, PushMessage, SendReport};
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};

/// Sends one multicast request per batch, authenticated with a server key.
#[derive(Clone)]
pub struct FcmNotifier {
  client:     reqwest::Client,
  endpoint:   String,
  server_key: String,
}

impl FcmNotifier {
  /// `client` should carry the request timeout.
  pub fn new(client: reqwest::Client, endpoint: String, server_key: String) -> Self {
    Self { client, endpoint, server_key }
  }
}

// ─── Wire format ─────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct SendRequest<'a> {
  notification:     Notification<'a>,
  data:             Data,
  registration_ids: &'a [String],
}

#[derive(Serialize)]
struct Notification<'a> {
  title:        &'a str,
  body:         &'a str,
  click_action: &'static str,
  sound:        &'static str,
}

#[derive(Serialize)]
struct Data {
  item_id: String,
}

#[derive(Deserialize)]
struct SendResponse {
  success: u32,
  failure: u32,
}

impl<'a> SendRequest<'a> {
  fn new(message: &'a PushMessage) -> Self {
    Self {
      notification:     Notification {
        title:        &message.title,
        body:         &message.body,
        click_action: "FLUTTER_NOTIFICATION_CLICK",
        sound:        "default",
      },
      data:             Data {
        item_id: message.item_id.to_string(),
      },
      registration_ids: &message.tokens,
    }
  }
}

// ─── Notifier impl ───────────────────────────────────────────────────────────

impl Notifier for FcmNotifier {
  async fn send(&self, message: &PushMessage) -> Result<SendReport, NotifierError> {
    if message.tokens.is_empty() {
      return Ok(SendReport::default());
    }

    let response = self
      .client
      .post(&self.endpoint)
      .header(AUTHORIZATION, format!("key={}", self.server_key))
      .json(&SendRequest::new(message))
      .send()
      .await
      .map_err(|e| NotifierError::Request(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      return Err(NotifierError::Rejected(format!("{status}: {body}")));
    }

    let parsed: SendResponse = response
      .json()
      .await
      .map_err(|e| NotifierError::Request(format!("malformed response: {e}")))?;

    Ok(SendReport {
      success: parsed.success,
      failure: parsed.failure,
    })
  }
}
