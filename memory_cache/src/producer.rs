use std::sync::{Arc, Weak};

use cradle_errors::CradleError;
use tokio::sync::{oneshot, watch};
use values::Value;

type Item = Option<Result<Value, CradleError>>;

/// The shared, cancellable outcome of one in-flight computation, broadcast to every caller
/// that asked for the same fingerprint while it was running. Adapted directly from
/// `async_value::AsyncValue`: a `watch` channel carries the eventual result to every
/// receiver, and a `oneshot` lets the first caller (the "producer") cancel the work if it
/// drops its handle before finishing, rather than leaving stragglers waiting forever.
pub struct Producer {
  item_receiver: Weak<watch::Receiver<Item>>,
  abort_sender: Option<oneshot::Sender<CradleError>>,
}

impl Producer {
  pub fn new() -> (Producer, ProducerSender, ProducerReceiver) {
    let (abort_sender, abort_receiver) = oneshot::channel();
    let (item_sender, item_receiver) = watch::channel(None);
    let item_receiver = Arc::new(item_receiver);
    (
      Producer {
        item_receiver: Arc::downgrade(&item_receiver),
        abort_sender: Some(abort_sender),
      },
      ProducerSender {
        item_sender,
        abort_receiver,
      },
      ProducerReceiver { item_receiver },
    )
  }

  /// A receiver for this producer's eventual result, unless every receiver (and thus all
  /// interest in the result) has already gone away.
  pub fn receiver(&self) -> Option<ProducerReceiver> {
    self
      .item_receiver
      .upgrade()
      .map(|item_receiver| ProducerReceiver { item_receiver })
  }

  /// Requests cancellation of the in-flight work, delivering `err` to every receiver that
  /// is still waiting. A no-op if the work has already completed.
  pub fn try_abort(&mut self, err: CradleError) {
    if let Some(abort_sender) = self.abort_sender.take() {
      let _ = abort_sender.send(err);
    }
  }
}

pub struct ProducerSender {
  item_sender: watch::Sender<Item>,
  abort_receiver: oneshot::Receiver<CradleError>,
}

impl ProducerSender {
  pub fn send(self, result: Result<Value, CradleError>) {
    let _ = self.item_sender.send(Some(result));
  }

  /// Resolves with the abort error if the producer handle is dropped or calls
  /// `try_abort` before this sender sends a result.
  pub async fn aborted(&mut self) -> CradleError {
    match (&mut self.abort_receiver).await {
      Ok(err) => err,
      Err(_) => CradleError::AsyncCancelled,
    }
  }
}

#[derive(Clone)]
pub struct ProducerReceiver {
  item_receiver: Arc<watch::Receiver<Item>>,
}

impl ProducerReceiver {
  /// Waits for the producer to finish (or for every sender/producer to be dropped, which is
  /// reported as `CradleError::AsyncCancelled`).
  pub async fn wait(&self) -> Result<Value, CradleError> {
    let mut receiver = (*self.item_receiver).clone();
    loop {
      if let Some(result) = receiver.borrow().clone() {
        return result;
      }
      if receiver.changed().await.is_err() {
        return Err(CradleError::AsyncCancelled);
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn receiver_observes_the_producers_result() {
    let (producer, sender, receiver) = Producer::new();
    drop(producer);
    sender.send(Ok(Value::Integer(7)));
    assert_eq!(receiver.wait().await.unwrap(), Value::Integer(7));
  }

  #[tokio::test]
  async fn dropping_every_receiver_lets_the_producer_know_no_one_is_listening() {
    let (producer, _sender, receiver) = Producer::new();
    drop(receiver);
    assert!(producer.receiver().is_none());
  }

  #[tokio::test]
  async fn aborting_delivers_the_error_to_a_waiting_receiver_via_the_sender_task() {
    let (mut producer, mut sender, receiver) = Producer::new();
    producer.try_abort(CradleError::logic_error("cancelled for test"));
    let err = sender.aborted().await;
    match err {
      CradleError::LogicError { message } => assert_eq!(message, "cancelled for test"),
      other => panic!("wrong error: {other:?}"),
    }
    // The sender never sent a value, and the producer is gone: waiting reports cancellation.
    drop(sender);
    assert!(matches!(receiver.wait().await, Err(CradleError::AsyncCancelled)));
  }
}
