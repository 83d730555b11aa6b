use async_trait::async_trait;
use cradle_errors::CradleError;

/// The boundary external-I/O request classes dispatch through; an actual HTTP client is out
/// of scope for this workspace, so callers supply one. Grounded in
/// `remote_provider_traits::ByteStoreProvider`'s shape: one small `async_trait` rather than
/// the hand-rolled `BoxFuture` pattern used by `request::LocalFunction`, since this trait has
/// no need to be object-safe across a registry the way request bodies do.
#[async_trait]
pub trait HttpExecutor: Send + Sync {
  async fn execute(&self, method: &str, url: &str, body: &[u8]) -> Result<HttpResponse, CradleError>;
}

/// The shape of a completed HTTP exchange, trimmed to what request bodies built on top of
/// `HttpExecutor` actually consume.
#[derive(Clone, Debug)]
pub struct HttpResponse {
  pub status: u16,
  pub body: Vec<u8>,
}

/// Bounds the number of concurrently in-flight calls a caller routes through one
/// `HttpExecutor`, per `HTTP_CONCURRENCY` (§6). Acquiring a permit is the caller's
/// responsibility around each `execute` call; this wrapper just owns the semaphore.
pub struct ConcurrencyLimiter {
  semaphore: tokio::sync::Semaphore,
}

impl ConcurrencyLimiter {
  pub fn new(concurrency: usize) -> ConcurrencyLimiter {
    ConcurrencyLimiter {
      semaphore: tokio::sync::Semaphore::new(concurrency.max(1)),
    }
  }

  pub async fn execute<E: HttpExecutor + ?Sized>(
    &self,
    executor: &E,
    method: &str,
    url: &str,
    body: &[u8],
  ) -> Result<HttpResponse, CradleError> {
    let _permit = self
      .semaphore
      .acquire()
      .await
      .map_err(|e| CradleError::logic_error(format!("HTTP concurrency semaphore closed: {e}")))?;
    executor.execute(method, url, body).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  struct CountingExecutor {
    calls: std::sync::atomic::AtomicUsize,
  }

  #[async_trait]
  impl HttpExecutor for CountingExecutor {
    async fn execute(&self, _method: &str, _url: &str, _body: &[u8]) -> Result<HttpResponse, CradleError> {
      self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
      Ok(HttpResponse {
        status: 200,
        body: b"ok".to_vec(),
      })
    }
  }

  #[tokio::test]
  async fn limiter_forwards_calls_to_the_executor() {
    let executor = CountingExecutor {
      calls: std::sync::atomic::AtomicUsize::new(0),
    };
    let limiter = ConcurrencyLimiter::new(2);
    let response = limiter.execute(&executor, "GET", "http://example.test", b"").await.unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(executor.calls.load(std::sync::atomic::Ordering::SeqCst), 1);
  }
}
