use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use clap::Parser;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use ruffhouse_protocol::*;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod game;

use game::*;

#[derive(Parser, Debug)]
#[command(name = "ruffhouse-server", about = "authoritative trick-taking room server")]
struct Args {
    /// Address to bind the WebSocket listener on.
    #[arg(long, default_value = "0.0.0.0:9001")]
    listen: String,
}

#[derive(Clone)]
struct AppState {
    inner: Arc<Mutex<Rooms>>,
}
type Rooms = HashMap<String, game::Room>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let state = AppState {
        inner: Arc::new(Mutex::new(HashMap::new())),
    };
    let app = Router::new()
        .route("/ws", get(ws_handler))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind(&args.listen).await?;
    info!("server listening on ws://{}/ws", args.listen);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    let (tx_out, mut rx_out) = mpsc::unbounded_channel::<ServerToClient>();

    tokio::spawn(async move {
        while let Some(msg) = rx_out.recv().await {
            let text = match serde_json::to_string(&msg) {
                Ok(text) => text,
                Err(e) => {
                    warn!("[WS] outbound encode failed: {e}");
                    continue;
                }
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let my_id = Uuid::new_v4();
    let _ = tx_out.send(ServerToClient::Hello {
        connection_id: my_id,
    });

    let mut joined_room: Option<String> = None;

    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Text(t) => match serde_json::from_str::<ClientToServer>(&t) {
                Ok(cmd) => route_cmd(cmd, &state, &mut joined_room, my_id, &tx_out),
                Err(e) => {
                    let _ = tx_out.send(ServerToClient::Error {
                        kind: ErrorKind::BadMessage,
                        message: format!("unparseable frame: {e}"),
                    });
                }
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    // The seat survives the connection; only the routing handle is severed.
    if let Some(room) = &joined_room {
        with_room(&state, room, |r| {
            mark_disconnected(r, my_id);
        });
    }
}

fn route_cmd(
    cmd: ClientToServer,
    state: &AppState,
    joined_room: &mut Option<String>,
    my_id: Uuid,
    tx_out: &mpsc::UnboundedSender<ServerToClient>,
) {
    debug!("[WS] from {} -> {:?}", &my_id.to_string()[..8], cmd);

    match cmd {
        ClientToServer::Join { room, player_id } => {
            let mut rooms = state.inner.lock();
            let r = rooms
                .entry(room.clone())
                .or_insert_with(|| game::Room::new(room.clone()));
            match join_or_reconnect(r, player_id, my_id, Some(tx_out.clone())) {
                Ok(_) => *joined_room = Some(room),
                Err(e) => send_game_err(tx_out, e),
            }
        }
        ClientToServer::SelectAvatar { choice } => {
            act(state, joined_room, tx_out, |r| select_avatar(r, my_id, choice));
        }
        ClientToServer::StartGame => {
            act(state, joined_room, tx_out, |r| start_game(r, my_id));
        }
        ClientToServer::SubmitBid { value } => {
            act(state, joined_room, tx_out, |r| submit_bid(r, my_id, value));
        }
        ClientToServer::PlayCard { card } => {
            act(state, joined_room, tx_out, |r| play_card(r, my_id, card));
        }
        ClientToServer::GetState => {
            act(state, joined_room, tx_out, |r| get_state(r, my_id));
        }
    }
}

/// Run a room action for a connection that has already joined, routing any
/// rejection back to that connection only.
fn act<F>(
    state: &AppState,
    joined_room: &Option<String>,
    tx_out: &mpsc::UnboundedSender<ServerToClient>,
    f: F,
) where
    F: FnOnce(&mut game::Room) -> Result<(), GameError>,
{
    let Some(room) = joined_room else {
        send_game_err(tx_out, GameError::NotSeated);
        return;
    };
    // Rooms are never evicted, so a joined connection's room always exists.
    with_room(state, room, |r| {
        if let Err(e) = f(r) {
            send_game_err(tx_out, e);
        }
    });
}

fn with_room<F: FnOnce(&mut game::Room)>(state: &AppState, room: &str, f: F) {
    let mut rooms = state.inner.lock();
    if let Some(r) = rooms.get_mut(room) {
        f(r);
    }
}

fn send_game_err(tx_out: &mpsc::UnboundedSender<ServerToClient>, e: GameError) {
    let _ = tx_out.send(ServerToClient::Error {
        kind: e.kind(),
        message: e.to_string(),
    });
}
