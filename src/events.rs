use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::mpsc;

/// One connected operator client: the id registered in the hub and the
/// receiving end its transport drains. Dropping the receiver is how a
/// transport "fails"; the next broadcast prunes it.
pub struct ClientHandle {
    pub client_id: String,
    pub receiver: mpsc::UnboundedReceiver<Value>,
}

/// In-process pub/sub for operator UI clients.
///
/// The client set lives behind a mutex; broadcasts snapshot the set and
/// release the lock before delivering, so a slow or dead client never
/// blocks the others. Delivery per client is FIFO through its own channel;
/// no ordering is promised across clients.
pub struct EventHub {
    clients: Mutex<HashMap<String, mpsc::UnboundedSender<Value>>>,
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

impl EventHub {
    pub fn new() -> Self {
        EventHub {
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub fn client_count(&self) -> usize {
        self.clients.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Register a new client. The `connected` envelope is queued first so
    /// the transport always observes it before any broadcast.
    pub fn connect(&self) -> ClientHandle {
        let client_id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::unbounded_channel();

        let _ = tx.send(json!({
            "type": "connected",
            "client_id": &client_id[..8],
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }));

        let total = {
            let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());
            clients.insert(client_id.clone(), tx);
            clients.len()
        };
        println!("🔌 WS client connected: {}... (total: {})", &client_id[..8], total);

        ClientHandle {
            client_id,
            receiver: rx,
        }
    }

    pub fn disconnect(&self, client_id: &str) {
        let total = {
            let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());
            clients.remove(client_id);
            clients.len()
        };
        println!("🔌 WS client disconnected: {}... (total: {})", &client_id[..8.min(client_id.len())], total);
    }

    /// Send an envelope to every connected client. Clients whose transport
    /// has gone away are removed. Returns the number of clients reached.
    pub fn broadcast(&self, mut envelope: Value) -> usize {
        if let Some(obj) = envelope.as_object_mut()
            && !obj.contains_key("timestamp")
        {
            obj.insert(
                "timestamp".to_string(),
                Value::String(chrono::Utc::now().to_rfc3339()),
            );
        }

        let snapshot: Vec<(String, mpsc::UnboundedSender<Value>)> = {
            let clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());
            clients
                .iter()
                .map(|(id, tx)| (id.clone(), tx.clone()))
                .collect()
        };

        let mut sent = 0usize;
        let mut dead: Vec<String> = Vec::new();
        for (client_id, tx) in snapshot {
            if tx.send(envelope.clone()).is_ok() {
                sent += 1;
            } else {
                eprintln!("⚠️ WS broadcast to {}... failed, dropping client", &client_id[..8]);
                dead.push(client_id);
            }
        }

        if !dead.is_empty() {
            let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());
            for id in dead {
                clients.remove(&id);
            }
        }

        sent
    }

    /// Tell connected UIs to re-query their current view.
    pub fn broadcast_refresh(&self, scope: &str, reason: &str) -> usize {
        self.broadcast(json!({
            "type": "refresh",
            "scope": scope,
            "reason": reason,
        }))
    }
}
