use crate::events::EventHub;
use rocket::futures::{SinkExt, StreamExt};
use rocket::serde::json::Json;
use rocket::{State, get};
use std::sync::Arc;

/// Real-time operator feed.
///
/// On connect the client receives a `connected` envelope, then `refresh`
/// envelopes as the pipeline produces work. A literal `"ping"` text frame
/// gets `{"type":"pong"}` back.
#[get("/api/v1/events/ws")]
pub fn events_ws(
    hub: &State<Arc<EventHub>>,
    ws: rocket_ws::WebSocket,
) -> rocket_ws::Channel<'static> {
    let hub = hub.inner().clone();
    ws.channel(move |mut stream| {
        Box::pin(async move {
            let mut handle = hub.connect();

            loop {
                tokio::select! {
                    envelope = handle.receiver.recv() => {
                        match envelope {
                            Some(envelope) => {
                                if stream
                                    .send(rocket_ws::Message::Text(envelope.to_string()))
                                    .await
                                    .is_err()
                                {
                                    break;
                                }
                            }
                            None => break,
                        }
                    }
                    incoming = stream.next() => {
                        match incoming {
                            Some(Ok(rocket_ws::Message::Text(text))) if text == "ping" => {
                                let pong = serde_json::json!({"type": "pong"}).to_string();
                                if stream.send(rocket_ws::Message::Text(pong)).await.is_err() {
                                    break;
                                }
                            }
                            Some(Ok(rocket_ws::Message::Close(_))) | None => break,
                            Some(Err(_)) => break,
                            _ => {}
                        }
                    }
                }
            }

            hub.disconnect(&handle.client_id);
            Ok(())
        })
    })
}

#[get("/api/v1/events/status")]
pub fn events_status(hub: &State<Arc<EventHub>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "websocket_clients": hub.client_count(),
    }))
}
