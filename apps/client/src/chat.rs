//! The chat view: one `select!` loop over composer keystrokes and the
//! three table subscriptions. Every notification invalidates its table
//! and triggers a full refetch; fetched lists replace the previous ones
//! wholesale. Teardown releases each subscription exactly once, stops
//! the typing timer, and flips presence off before returning.

use std::io::Write as _;
use std::sync::Arc;

use crossterm::{
    cursor::MoveTo,
    event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, Clear, ClearType},
};
use futures_util::StreamExt;
use parlor_store::{ChatMessage, ChatStore, Profile, Subscription, TypingPeer};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{AppError, AppResult};
use crate::feed::MessageFeed;
use crate::presence::PresenceTracker;
use crate::render;
use crate::session::SessionIdentity;
use crate::typing::TypingTracker;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatOutcome {
    /// `/quit`: leave and clear the persisted session.
    Logout,
    /// Ctrl-C: leave, session stays for the next start.
    Quit,
}

#[derive(Debug, Clone, Copy)]
enum Refresh {
    Messages,
    Presence,
    Typing,
}

struct ViewState {
    messages: Vec<ChatMessage>,
    online: Vec<Profile>,
    typing_peers: Vec<TypingPeer>,
    draft: String,
    notice: Option<String>,
    feed_open: bool,
}

pub async fn run(store: Arc<dyn ChatStore>, session: SessionIdentity) -> AppResult<ChatOutcome> {
    let feed = MessageFeed::new(Arc::clone(&store), session.clone());
    let presence = PresenceTracker::new(Arc::clone(&store), session.profile_id);
    let typing = TypingTracker::new(Arc::clone(&store), session.profile_id);

    let (refresh_tx, mut refresh_rx) = mpsc::unbounded_channel();
    let watchers = [
        spawn_watcher(feed.subscribe(), Refresh::Messages, refresh_tx.clone()),
        spawn_watcher(presence.subscribe(), Refresh::Presence, refresh_tx.clone()),
        spawn_watcher(typing.subscribe(), Refresh::Typing, refresh_tx),
    ];

    presence.set_online_detached(true);

    let mut view = ViewState {
        messages: Vec::new(),
        online: Vec::new(),
        typing_peers: Vec::new(),
        draft: String::new(),
        notice: None,
        feed_open: true,
    };
    for tag in [Refresh::Messages, Refresh::Presence, Refresh::Typing] {
        refresh(&feed, &presence, &typing, &mut view, tag).await;
    }

    let result = match enable_raw_mode() {
        Ok(()) => {
            let outcome = view_loop(
                &session,
                &feed,
                &presence,
                &typing,
                &mut view,
                &mut refresh_rx,
            )
            .await;
            let _ = disable_raw_mode();
            outcome
        }
        Err(err) => Err(err.into()),
    };

    // Teardown runs on every exit path, error or not: each watcher owns
    // one subscription and aborting it drops that subscription once.
    for watcher in watchers {
        watcher.abort();
    }
    typing.shutdown().await;
    presence.clear_online().await;

    result
}

fn spawn_watcher(
    mut subscription: Subscription,
    tag: Refresh,
    tx: mpsc::UnboundedSender<Refresh>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(()) = subscription.notified().await {
            if tx.send(tag).is_err() {
                break;
            }
        }
    })
}

async fn view_loop(
    session: &SessionIdentity,
    feed: &MessageFeed,
    presence: &PresenceTracker,
    typing: &TypingTracker,
    view: &mut ViewState,
    refresh_rx: &mut mpsc::UnboundedReceiver<Refresh>,
) -> AppResult<ChatOutcome> {
    let mut input = EventStream::new();

    loop {
        draw(session, feed, view)?;

        tokio::select! {
            maybe_event = input.next() => match maybe_event {
                Some(Ok(Event::Key(key))) if key.kind != KeyEventKind::Release => {
                    if let Some(outcome) = handle_key(key, feed, typing, view).await? {
                        return Ok(outcome);
                    }
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => return Err(err.into()),
                None => return Ok(ChatOutcome::Quit),
            },
            maybe_refresh = refresh_rx.recv(), if view.feed_open => match maybe_refresh {
                Some(tag) => refresh(feed, presence, typing, view, tag).await,
                None => {
                    // All watchers ended: the notification feed is gone.
                    // Stale data from here on, by contract.
                    view.feed_open = false;
                    view.notice = Some("connection lost, showing last known state".to_string());
                }
            },
        }
    }
}

async fn handle_key(
    key: KeyEvent,
    feed: &MessageFeed,
    typing: &TypingTracker,
    view: &mut ViewState,
) -> AppResult<Option<ChatOutcome>> {
    match key.code {
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            return Ok(Some(ChatOutcome::Quit));
        }
        KeyCode::Char(c) => {
            view.draft.push(c);
            typing.on_input().await;
        }
        KeyCode::Backspace => {
            if view.draft.pop().is_some() {
                typing.on_input().await;
            }
        }
        KeyCode::Enter => {
            if view.draft.trim() == "/quit" {
                return Ok(Some(ChatOutcome::Logout));
            }
            typing.on_send().await;
            match feed.send(&view.draft).await {
                Ok(()) => {
                    // The insert notification will refetch; nothing is
                    // appended locally.
                    view.draft.clear();
                    view.notice = None;
                }
                Err(AppError::Validation(message)) => {
                    view.notice = Some(message);
                }
                Err(AppError::Store(err)) => {
                    // Surfaced once, no retry, draft kept for the user.
                    view.notice = Some(format!("send failed: {err}"));
                }
                Err(other) => return Err(other),
            }
        }
        _ => {}
    }
    Ok(None)
}

async fn refresh(
    feed: &MessageFeed,
    presence: &PresenceTracker,
    typing: &TypingTracker,
    view: &mut ViewState,
    tag: Refresh,
) {
    match tag {
        Refresh::Messages => match feed.fetch_all().await {
            Ok(messages) => view.messages = messages,
            Err(err) => tracing::warn!(error = %err, "message refetch failed"),
        },
        Refresh::Presence => match presence.fetch_online().await {
            Ok(online) => view.online = online,
            Err(err) => tracing::warn!(error = %err, "online-list refetch failed"),
        },
        Refresh::Typing => match typing.fetch_peers().await {
            Ok(peers) => view.typing_peers = peers,
            Err(err) => tracing::warn!(error = %err, "typing refetch failed"),
        },
    }
}

fn draw(session: &SessionIdentity, feed: &MessageFeed, view: &ViewState) -> AppResult<()> {
    let mut out = std::io::stdout();
    execute!(out, Clear(ClearType::All), MoveTo(0, 0))?;

    let mut lines = vec![render::online_line(&view.online, &session.username), String::new()];
    for message in &view.messages {
        lines.extend(render::message_lines(
            message,
            feed.is_own(message),
            render::VIEW_WIDTH,
        ));
    }
    if let Some(typing) = render::typing_line(&view.typing_peers) {
        lines.push(typing);
    }
    if let Some(notice) = &view.notice {
        lines.push(format!("! {notice}"));
    }
    lines.push(String::new());

    for line in lines {
        write!(out, "{line}\r\n")?;
    }
    write!(out, "> {}", view.draft)?;
    out.flush()?;
    Ok(())
}
