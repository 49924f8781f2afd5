//! WebSocket upgrade + message loop. Client messages are parsed as JSON; the socket also
//! streams countdown ticks for the micro-task it is watching. When the socket goes away
//! the countdown it started is cancelled (the owning view unmounted).

use std::sync::Arc;
use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tokio::sync::watch;
use tracing::{debug, error, info, instrument};

use crate::protocol::{ClientWsMessage, ServerWsMessage};
use crate::state::AppState;

type Watching = Option<(String, watch::Receiver<u32>)>;

enum Event {
  Client(Option<Result<Message, axum::Error>>),
  Tick(Option<u32>),
}

#[instrument(level = "info", skip(state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "mastery_backend", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
  info!(target: "mastery_backend", "WebSocket connected");
  let mut watching: Watching = None;

  loop {
    let event = {
      let tick = next_tick(&mut watching);
      tokio::select! {
        msg = socket.recv() => Event::Client(msg),
        t = tick => Event::Tick(t),
      }
    };

    let reply = match event {
      Event::Client(Some(Ok(Message::Text(txt)))) => match serde_json::from_str::<ClientWsMessage>(&txt) {
        Ok(incoming) => {
          debug!(target: "mastery_backend", "WS received: {:?}", &incoming);
          handle_client_ws(incoming, &state, &mut watching).await
        }
        Err(e) => ServerWsMessage::Error { message: format!("Invalid JSON: {}", e) },
      },
      Event::Client(Some(Ok(Message::Ping(payload)))) => {
        let _ = socket.send(Message::Pong(payload)).await;
        continue;
      }
      Event::Client(Some(Ok(Message::Close(_)))) | Event::Client(None) | Event::Client(Some(Err(_))) => break,
      Event::Client(Some(Ok(_))) => continue,
      Event::Tick(Some(remaining_seconds)) => match &watching {
        Some((assignment_id, _)) => ServerWsMessage::Countdown { assignment_id: assignment_id.clone(), remaining_seconds },
        None => continue,
      },
      // Sender gone: countdown finished, was completed, or was superseded.
      Event::Tick(None) => match watching.take() {
        Some((assignment_id, _)) => ServerWsMessage::CountdownStopped { assignment_id },
        None => continue,
      },
    };

    let out = serde_json::to_string(&reply).unwrap_or_else(|e| {
      serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e) }).to_string()
    });
    if let Err(e) = socket.send(Message::Text(out)).await {
      error!(target: "mastery_backend", error = %e, "WS send error");
      break;
    }
  }

  release(&state, &mut watching).await;
  info!(target: "mastery_backend", "WebSocket disconnected");
}

/// Next countdown value, `None` once the countdown is gone. Pends while nothing is watched.
async fn next_tick(watching: &mut Watching) -> Option<u32> {
  match watching {
    Some((_, rx)) => match rx.changed().await {
      Ok(()) => Some(*rx.borrow_and_update()),
      Err(_) => None,
    },
    None => std::future::pending().await,
  }
}

/// Cancel the countdown this socket owns, if any.
async fn release(state: &AppState, watching: &mut Watching) {
  if let Some((assignment_id, _)) = watching.take() {
    if state.scaffolding.stop(&assignment_id).await {
      debug!(target: "scaffolding", %assignment_id, "WS countdown released");
    }
  }
}

/// A socket owns at most one countdown: watching a new one cancels the previous, and
/// only the owned countdown can be stopped from here.
#[instrument(level = "info", skip(state, watching))]
async fn handle_client_ws(msg: ClientWsMessage, state: &AppState, watching: &mut Watching) -> ServerWsMessage {
  match msg {
    ClientWsMessage::Ping => ServerWsMessage::Pong,

    ClientWsMessage::WatchCountdown { assignment_id } => {
      if !matches!(watching, Some((id, _)) if *id == assignment_id) {
        release(state, watching).await;
      }
      match state.scaffolding.start(&assignment_id).await {
        Ok(mut rx) => {
          let remaining_seconds = *rx.borrow_and_update();
          *watching = Some((assignment_id.clone(), rx));
          info!(target: "scaffolding", %assignment_id, remaining_seconds, "WS countdown started");
          ServerWsMessage::Countdown { assignment_id, remaining_seconds }
        }
        Err(e) => ServerWsMessage::Error { message: e.to_string() },
      }
    }

    ClientWsMessage::StopCountdown { assignment_id } => {
      if matches!(watching, Some((id, _)) if *id == assignment_id) {
        release(state, watching).await;
        ServerWsMessage::CountdownStopped { assignment_id }
      } else {
        ServerWsMessage::Error { message: format!("countdown for assignment {assignment_id} is not owned by this connection") }
      }
    }
  }
}
