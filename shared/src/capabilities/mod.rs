mod auth;
mod kv;
mod realtime;
mod store;

pub use self::auth::{Auth, AuthError, AuthOperation, AuthOutput, AuthResult};
pub use self::kv::{
    KeyNamespace, KvError, KvKey, KvOperation, KvOutput, KvResult, Preferences, MAX_KEY_LENGTH,
    MAX_VALUE_SIZE,
};
pub use self::realtime::{
    ChangeFeed, ChangeFeedError, ChangeFeedOperation, ChangeScope, ChangeSignal,
};
pub use self::store::{
    NewReport, OwnerScope, Store, StoreError, StoreOperation, StoreOutput, StoreResult,
    NO_ROWS_CODE,
};

pub use crux_core::render::Render;

use crate::app::App;
use crate::event::Event;

#[derive(crux_core::macros::Effect)]
pub struct Capabilities {
    pub auth: Auth<Event>,
    pub store: Store<Event>,
    pub change_feed: ChangeFeed<Event>,
    pub preferences: Preferences<Event>,
    pub render: Render<Event>,
}
