pub mod accumulator;
pub mod buffer_utils;
pub mod client;
pub mod config;
pub mod error;
pub mod event_source;
pub mod preferences;
pub mod streaming;
pub mod traits;
pub mod transport;
pub mod types;

pub use accumulator::{AccumulatorUpdate, StreamAccumulator};
pub use client::{OpenCodeClient, OpenCodeClientBuilder};
pub use config::{normalize_base_url, ClientConfig, ReconnectPolicy};
pub use error::{ClientError, Result};
pub use event_source::{
    ChannelHandler, ConnectionState, EventCallbacks, EventHandler, EventStreamManager,
};
pub use preferences::{MemoryPreferenceStore, PreferenceStore, Preferences, TomlPreferenceStore};
pub use streaming::{OpenCodeEventParser, StreamEvent, StreamUpdate};
pub use traits::{OpenCodeApi, PromptRequest};
pub use transport::HttpTransport;
pub use types::{
    Health, Message, MessageInfo, ModelSelection, Part, PartKind, PathInfo, Project,
    ProviderInfo, ProvidersResponse, Role, Session, ToolStatus,
};
