// Fan-out of accepted samples to every connected observer

mod hub;

pub use hub::{
    BroadcastHub, ConnectionId, ConnectionState, Dispatcher, HubConfig, HubStats, Observer,
    PendingConnection,
};
