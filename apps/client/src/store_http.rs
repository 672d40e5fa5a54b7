use async_trait::async_trait;
use futures_util::StreamExt;
use parlor_store::{
    ChangeEvent, ChatMessage, ChatStore, Interest, Profile, StoreError, StoreResult, Subscription,
    TypingPeer,
};
use reqwest::StatusCode;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use url::Url;
use uuid::Uuid;

const FEED_CAPACITY: usize = 256;

/// [`ChatStore`] over the hosted backend: REST for the table
/// operations, a websocket for the change-notification feed.
pub struct HttpStore {
    client: reqwest::Client,
    base_url: Url,
    events: broadcast::Sender<ChangeEvent>,
}

#[derive(Debug, Serialize)]
struct CreateProfileBody<'a> {
    username: &'a str,
}

#[derive(Debug, Serialize)]
struct SetOnlineBody {
    online: bool,
}

#[derive(Debug, Serialize)]
struct SendMessageBody<'a> {
    profile_id: Uuid,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct TypingBody {
    is_typing: bool,
}

impl HttpStore {
    /// Connects the notification feed and returns the store. No request
    /// timeout is configured: a hung call blocks that one operation
    /// until the transport gives up.
    pub async fn connect(base_url: Url, ws_url: Url) -> StoreResult<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        let (ws_stream, _) = connect_async(ws_url.as_str())
            .await
            .map_err(|e| StoreError::Transport(format!("feed connect failed: {e}")))?;
        let (_write, mut read) = ws_stream.split();

        let (events, _) = broadcast::channel(FEED_CAPACITY);
        let feed = events.clone();
        tokio::spawn(async move {
            while let Some(frame) = read.next().await {
                match frame {
                    Ok(Message::Text(text)) => match serde_json::from_str::<ChangeEvent>(&text) {
                        Ok(event) => {
                            let _ = feed.send(event);
                        }
                        Err(err) => {
                            tracing::warn!(error = %err, frame = %text, "unparseable change event");
                        }
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(err) => {
                        tracing::warn!(error = %err, "notification feed failed");
                        break;
                    }
                }
            }
            // No reconnection: a dropped feed means stale data until the
            // client restarts. Existing subscriptions observe the close.
            tracing::warn!("notification feed closed");
        });

        Ok(Self {
            client,
            base_url,
            events,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> StoreResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::Transport("server url cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn check(response: reqwest::Response) -> StoreResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(StoreError::Rejected(format!("{status}: {body}")))
    }
}

fn transport(err: reqwest::Error) -> StoreError {
    StoreError::Transport(err.to_string())
}

fn decode(err: reqwest::Error) -> StoreError {
    StoreError::Decode(err.to_string())
}

#[async_trait]
impl ChatStore for HttpStore {
    async fn find_profile(&self, username: &str) -> StoreResult<Option<Profile>> {
        let url = self.endpoint(&["profiles", "by-username", username])?;
        let response = self.client.get(url).send().await.map_err(transport)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = Self::check(response).await?;
        Ok(Some(response.json().await.map_err(decode)?))
    }

    async fn create_profile(&self, username: &str) -> StoreResult<Profile> {
        let url = self.endpoint(&["profiles"])?;
        let response = self
            .client
            .post(url)
            .json(&CreateProfileBody { username })
            .send()
            .await
            .map_err(transport)?;
        let response = Self::check(response).await?;
        response.json().await.map_err(decode)
    }

    async fn set_online(&self, profile_id: Uuid, online: bool) -> StoreResult<()> {
        let url = self.endpoint(&["profiles", &profile_id.to_string(), "online"])?;
        let response = self
            .client
            .put(url)
            .json(&SetOnlineBody { online })
            .send()
            .await
            .map_err(transport)?;
        Self::check(response).await?;
        Ok(())
    }

    async fn online_profiles(&self) -> StoreResult<Vec<Profile>> {
        let url = self.endpoint(&["profiles", "online"])?;
        let response = self.client.get(url).send().await.map_err(transport)?;
        let response = Self::check(response).await?;
        response.json().await.map_err(decode)
    }

    async fn insert_message(&self, profile_id: Uuid, content: &str) -> StoreResult<ChatMessage> {
        let url = self.endpoint(&["messages"])?;
        let response = self
            .client
            .post(url)
            .json(&SendMessageBody {
                profile_id,
                content,
            })
            .send()
            .await
            .map_err(transport)?;
        let response = Self::check(response).await?;
        response.json().await.map_err(decode)
    }

    async fn fetch_messages(&self) -> StoreResult<Vec<ChatMessage>> {
        let url = self.endpoint(&["messages"])?;
        let response = self.client.get(url).send().await.map_err(transport)?;
        let response = Self::check(response).await?;
        response.json().await.map_err(decode)
    }

    async fn upsert_typing(&self, profile_id: Uuid, is_typing: bool) -> StoreResult<()> {
        let url = self.endpoint(&["typing", &profile_id.to_string()])?;
        let response = self
            .client
            .put(url)
            .json(&TypingBody { is_typing })
            .send()
            .await
            .map_err(transport)?;
        Self::check(response).await?;
        Ok(())
    }

    async fn typing_peers(&self, except: Uuid) -> StoreResult<Vec<TypingPeer>> {
        let mut url = self.endpoint(&["typing"])?;
        url.query_pairs_mut()
            .append_pair("except", &except.to_string());
        let response = self.client.get(url).send().await.map_err(transport)?;
        let response = Self::check(response).await?;
        response.json().await.map_err(decode)
    }

    fn subscribe(&self, interest: Interest) -> Subscription {
        Subscription::new(interest, self.events.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_at(base: &str) -> HttpStore {
        let (events, _) = broadcast::channel(1);
        HttpStore {
            client: reqwest::Client::new(),
            base_url: Url::parse(base).expect("base url"),
            events,
        }
    }

    #[test]
    fn endpoints_join_and_encode_segments() {
        let store = store_at("http://127.0.0.1:3000");
        assert_eq!(
            store
                .endpoint(&["profiles", "by-username", "alice bob"])
                .expect("endpoint")
                .as_str(),
            "http://127.0.0.1:3000/profiles/by-username/alice%20bob"
        );

        let nested = store_at("http://127.0.0.1:3000/api/");
        assert_eq!(
            nested.endpoint(&["messages"]).expect("endpoint").as_str(),
            "http://127.0.0.1:3000/api/messages"
        );
    }
}
