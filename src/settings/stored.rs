use super::{Shared, Subscription};
use crate::Error;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// A typed value persisted under one storage key.
///
/// Reads fall back to the default when the key was never written or holds
/// something that does not parse. Broadcast values are published to other
/// hubs and local subscribers whenever a write changes them.
pub struct Stored<T> {
    shared: Arc<Shared>,
    name: String,
    default: T,
    broadcast: bool,
}

impl<T> Stored<T>
where
    T: Serialize + DeserializeOwned + Clone + PartialEq + Send + Sync + 'static,
{
    /// Value `field` under `prefix`, persisted but not broadcast.
    pub fn new(shared: Arc<Shared>, prefix: &str, field: &str, default: T) -> Self {
        let name = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{}:{}", prefix, field)
        };
        Stored {
            shared,
            name,
            default,
            broadcast: false,
        }
    }

    /// Also broadcast changes.
    pub fn broadcast(mut self) -> Self {
        self.broadcast = true;
        self
    }

    /// Storage key.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current value.
    pub fn get(&self) -> T {
        let raw = match self.shared.storage().get_item(&self.name) {
            Some(raw) => raw,
            None => return self.default.clone(),
        };
        serde_json::from_str(&raw).unwrap_or_else(|e| {
            debug!(name = %self.name, error = %e, "stored value does not parse, using default");
            self.default.clone()
        })
    }

    /// Persists `value`, then publishes it if it changed.
    pub fn set(&self, value: T) -> Result<(), Error> {
        let previous = self.get();
        let json = serde_json::to_value(&value)?;
        self.shared.storage().set_item(&self.name, &json.to_string())?;
        if self.broadcast && previous != value {
            self.shared.publish(&self.name, json);
        }
        Ok(())
    }

    /// Modifies the value in place.
    pub fn update(&self, f: impl FnOnce(&mut T)) -> Result<(), Error> {
        let mut value = self.get();
        f(&mut value);
        self.set(value)
    }

    /// Calls `f` with every published value.
    pub fn subscribe(&self, f: impl Fn(T) + Send + Sync + 'static) -> Subscription {
        let name = self.name.clone();
        self.shared.subscribe(&self.name, move |value| {
            match serde_json::from_value(value.clone()) {
                Ok(v) => f(v),
                Err(e) => debug!(name = %name, error = %e, "ignoring unparsable update"),
            }
        })
    }
}
