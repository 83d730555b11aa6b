use tokio::sync::watch;

/// Owned by the root of one resolution's tree; calling [`CancellationSource::cancel`]
/// is observed by every [`CancellationToken`] cloned from it, cooperatively stopping the
/// whole subtree (§3 "a shared cancellation source at the root").
pub struct CancellationSource {
  sender: watch::Sender<bool>,
}

impl CancellationSource {
  pub fn new() -> (CancellationSource, CancellationToken) {
    let (sender, receiver) = watch::channel(false);
    (CancellationSource { sender }, CancellationToken { receiver })
  }

  pub fn cancel(&self) {
    // Only fails if every receiver has been dropped, which is harmless to ignore here.
    let _ = self.sender.send(true);
  }

  pub fn is_cancelled(&self) -> bool {
    *self.sender.borrow()
  }
}

#[derive(Clone)]
pub struct CancellationToken {
  receiver: watch::Receiver<bool>,
}

impl CancellationToken {
  pub fn is_cancelled(&self) -> bool {
    *self.receiver.borrow()
  }

  /// Resolves once the tree has been cancelled; a no-op if it already has been.
  pub async fn cancelled(&self) {
    let mut receiver = self.receiver.clone();
    while !*receiver.borrow() {
      if receiver.changed().await.is_err() {
        // The source was dropped without ever cancelling; treat as "never cancels".
        return;
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn cancellation_is_observed_by_cloned_tokens() {
    let (source, token) = CancellationSource::new();
    let other = token.clone();
    assert!(!token.is_cancelled());
    source.cancel();
    assert!(token.is_cancelled());
    assert!(other.is_cancelled());
    other.cancelled().await;
  }
}
