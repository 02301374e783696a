//! Bale destination transport — Bot API client for outbound sends.
//!
//! Bale exposes a Telegram-compatible Bot API surface; media goes out as
//! multipart uploads with fixed file names.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use tracing::info;

use crate::channels::DestinationClient;
use crate::error::DispatchError;

const BALE_API_BASE: &str = "https://tapi.bale.ai";

/// Bale Bot API client.
pub struct BaleClient {
    bot_token: String,
    client: reqwest::Client,
}

impl BaleClient {
    pub fn new(bot_token: String) -> Self {
        Self {
            bot_token,
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!("{BALE_API_BASE}/bot{}/{method}", self.bot_token)
    }

    /// Upload one media part as a multipart form.
    async fn send_media(
        &self,
        method: &'static str,
        field: &'static str,
        file_name: &'static str,
        dest: &str,
        bytes: Vec<u8>,
        caption: Option<&str>,
    ) -> Result<(), DispatchError> {
        let part = Part::bytes(bytes).file_name(file_name);

        let mut form = Form::new()
            .text("chat_id", dest.to_string())
            .part(field, part);

        if let Some(cap) = caption {
            form = form.text("caption", cap.to_string());
        }

        let resp = self
            .client
            .post(self.api_url(method))
            .multipart(form)
            .send()
            .await
            .map_err(|e| DispatchError::SendFailed {
                method,
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            let err = resp.text().await.unwrap_or_default();
            return Err(DispatchError::SendFailed {
                method,
                reason: err,
            });
        }

        info!(dest, method, "Media sent to Bale");
        Ok(())
    }
}

#[async_trait]
impl DestinationClient for BaleClient {
    async fn send_text(&self, dest: &str, text: &str) -> Result<(), DispatchError> {
        let resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&serde_json::json!({
                "chat_id": dest,
                "text": text,
            }))
            .send()
            .await
            .map_err(|e| DispatchError::SendFailed {
                method: "sendMessage",
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            let err = resp.text().await.unwrap_or_default();
            return Err(DispatchError::SendFailed {
                method: "sendMessage",
                reason: err,
            });
        }
        Ok(())
    }

    async fn send_photo(
        &self,
        dest: &str,
        bytes: Vec<u8>,
        caption: Option<&str>,
    ) -> Result<(), DispatchError> {
        self.send_media("sendPhoto", "photo", "photo.jpg", dest, bytes, caption)
            .await
    }

    async fn send_video(
        &self,
        dest: &str,
        bytes: Vec<u8>,
        caption: Option<&str>,
    ) -> Result<(), DispatchError> {
        self.send_media("sendVideo", "video", "video.mp4", dest, bytes, caption)
            .await
    }
}
