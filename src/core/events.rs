//! Change events emitted by a window model
//!
//! Each model owns one [`ModelEventDispatcher`]. Listeners are called
//! synchronously, in registration order, from inside the call that caused
//! the change.

use std::sync::mpsc::{channel, Receiver, Sender};

use tracing::trace;

use crate::core::property::GridRowId;
use crate::core::value::{PropertyName, PropertyValues, Value};

/// Something observers of a window model may want to react to
#[derive(Debug, Clone, PartialEq)]
pub enum ModelEvent {
    /// A record was loaded; every property may have changed
    AllPropertiesChanged { model_id: String },

    PropertyChanged {
        model_id: String,
        name: PropertyName,
        value: Value,
        old_value: Value,
    },

    GridPropertyChanged {
        model_id: String,
        grid: PropertyName,
        row_id: GridRowId,
        name: PropertyName,
        value: Value,
        old_value: Value,
    },

    GridRowAdded {
        model_id: String,
        grid: PropertyName,
        row_id: GridRowId,
        values: PropertyValues,
    },

    GridRowRemoved {
        model_id: String,
        grid: PropertyName,
        row_id: GridRowId,
    },

    /// Navigation was requested with unsaved changes and the caller asked to
    /// be consulted before they are discarded
    ConfirmDiscardChanges { model_id: String },
}

impl ModelEvent {
    pub fn model_id(&self) -> &str {
        match self {
            ModelEvent::AllPropertiesChanged { model_id }
            | ModelEvent::PropertyChanged { model_id, .. }
            | ModelEvent::GridPropertyChanged { model_id, .. }
            | ModelEvent::GridRowAdded { model_id, .. }
            | ModelEvent::GridRowRemoved { model_id, .. }
            | ModelEvent::ConfirmDiscardChanges { model_id } => model_id,
        }
    }
}

/// Handle returned by [`ModelEventDispatcher::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Box<dyn FnMut(&ModelEvent) + Send>;

enum Subscriber {
    Callback(Listener),
    Channel(Sender<ModelEvent>),
}

/// Ordered list of event subscribers
#[derive(Default)]
pub struct ModelEventDispatcher {
    subscribers: Vec<(ListenerId, Subscriber)>,
    next_id: u64,
}

impl ModelEventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&mut self, listener: F) -> ListenerId
    where
        F: FnMut(&ModelEvent) + Send + 'static,
    {
        self.add(Subscriber::Callback(Box::new(listener)))
    }

    /// Receive events through a channel; dropped receivers are forgotten
    pub fn subscribe_channel(&mut self) -> (ListenerId, Receiver<ModelEvent>) {
        let (sender, receiver) = channel();
        let id = self.add(Subscriber::Channel(sender));
        (id, receiver)
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(existing, _)| *existing != id);
        before != self.subscribers.len()
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    pub fn post(&mut self, event: ModelEvent) {
        trace!("Firing event: {:?}", event);
        self.subscribers.retain_mut(|(_, subscriber)| match subscriber {
            Subscriber::Callback(listener) => {
                listener(&event);
                true
            }
            Subscriber::Channel(sender) => sender.send(event.clone()).is_ok(),
        });
    }

    pub fn post_all<I>(&mut self, events: I)
    where
        I: IntoIterator<Item = ModelEvent>,
    {
        for event in events {
            self.post(event);
        }
    }

    fn add(&mut self, subscriber: Subscriber) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.subscribers.push((id, subscriber));
        id
    }
}

impl std::fmt::Debug for ModelEventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelEventDispatcher")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}
