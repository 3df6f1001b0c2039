use crate::config::Settings;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::broadcast::{self, Receiver, Sender};

#[derive(Clone)]
pub struct EventBus {
    tx: Sender<Event>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel::<Event>(100);
        Self { tx }
    }

    pub fn send(&self, event: Event) {
        let result = self.tx.send(event);

        if let Err(e) = result {
            error!("Error while sending event: {:?}", e);
        }
    }

    pub fn subscribe(&self) -> Subscriber {
        Subscriber::new(self.tx.subscribe())
    }
}

pub struct Subscriber {
    rx: Receiver<Event>,
}

impl Subscriber {
    pub fn new(rx: Receiver<Event>) -> Self {
        Self { rx }
    }

    pub fn try_recv(&mut self) -> Result<Event, TryRecvError> {
        self.rx.try_recv()
    }

    /// Waits for the next event. `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.rx.recv().await {
                Ok(event) => break Some(event),
                Err(RecvError::Closed) => break None,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(
                        "EventBus::Subscriber lagging behind senders, skipping {skipped} messages"
                    );
                }
            }
        }
    }
}

#[derive(Clone, Debug)]
pub enum SpeechAction {
    /// Speak arbitrary text now
    Speak { text: String },

    /// Speak the `text` from the current settings
    GenerateNow,
}

#[derive(Clone, Debug)]
pub enum Event {
    /// Replace all source settings
    UpdateSettings(Box<Settings>),

    Speech(SpeechAction),

    /// Stop detection, finish or abandon generation, and exit
    Shutdown,
}

pub fn debug(bus: &EventBus) {
    let mut subscriber = bus.subscribe();
    tokio::spawn(async move {
        while let Some(event) = subscriber.recv().await {
            debug!("Received event: {:?}", event);
        }
    });
}
