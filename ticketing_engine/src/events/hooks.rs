use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{EventHandler, EventProducer, Handler, TransactionAcceptedEvent, TransactionAnnulledEvent};

#[derive(Default, Clone)]
pub struct EventProducers {
    pub transaction_accepted_producer: Vec<EventProducer<TransactionAcceptedEvent>>,
    pub transaction_annulled_producer: Vec<EventProducer<TransactionAnnulledEvent>>,
}

pub struct EventHandlers {
    pub on_transaction_accepted: Option<EventHandler<TransactionAcceptedEvent>>,
    pub on_transaction_annulled: Option<EventHandler<TransactionAnnulledEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_transaction_accepted = hooks.on_transaction_accepted.map(|f| EventHandler::new(buffer_size, f));
        let on_transaction_annulled = hooks.on_transaction_annulled.map(|f| EventHandler::new(buffer_size, f));
        Self { on_transaction_accepted, on_transaction_annulled }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_transaction_accepted {
            result.transaction_accepted_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_transaction_annulled {
            result.transaction_annulled_producer.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_transaction_accepted {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_transaction_annulled {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_transaction_accepted: Option<Handler<TransactionAcceptedEvent>>,
    pub on_transaction_annulled: Option<Handler<TransactionAnnulledEvent>>,
}

impl EventHooks {
    pub fn on_transaction_accepted<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(TransactionAcceptedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_transaction_accepted = Some(Arc::new(f));
        self
    }

    pub fn on_transaction_annulled<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(TransactionAnnulledEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_transaction_annulled = Some(Arc::new(f));
        self
    }
}
