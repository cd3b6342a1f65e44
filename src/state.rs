use crate::config::Config;
use crate::dictionary::DictionaryHolder;
use crate::guard::ScrapeGuard;
use crate::room::RoomRegistry;
use crate::session::SessionRegistry;
use crate::store::{JsonFileStore, Stores};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::{Mutex, mpsc};
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub dictionary: Arc<DictionaryHolder>,
    pub guard: Arc<ScrapeGuard>,
    pub sessions: Arc<SessionRegistry>,
    pub rooms: Arc<RoomRegistry>,
    pub connections: ConnectionInfoMap,
    pub stores: Arc<Stores>,
}

impl AppState {
    /// All state is in-memory and owned by this process; only the JSON
    /// stores touch disk.
    pub fn new(config: Config) -> Self {
        let stores = Stores::new(Box::new(JsonFileStore::new(config.data_dir.clone())));
        Self {
            config: Arc::new(config),
            dictionary: Arc::new(DictionaryHolder::empty()),
            guard: Arc::new(ScrapeGuard::new()),
            sessions: Arc::new(SessionRegistry::new()),
            rooms: Arc::new(RoomRegistry::new()),
            connections: Default::default(),
            stores: Arc::new(stores),
        }
    }
}

/// One live socket. Outbound messages go through an unbounded channel; the
/// socket task drains it into the sink, so broadcasts never block on a slow
/// peer and tests can observe traffic without a real socket.
#[derive(Debug)]
pub struct ConnectionInfo {
    pub socket_id: Uuid,
    pub ip: String,
    pub sender: mpsc::UnboundedSender<String>,
}

pub type ConnectionInfoMap = Arc<Mutex<HashMap<Uuid, Arc<ConnectionInfo>>>>;
