use std::time::Duration;

/// How aggressively a request's result is cached (§4.3).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CachingLevel {
  /// Never cached; re-run on every resolution.
  None,
  /// Cached only in the in-process memory cache.
  Memory,
  /// Cached in both the memory cache and the secondary (disk) cache.
  Full,
}

/// How a request's body runs, crossing the local/remote and sync/async axes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FunctionFlavour {
  Plain,
  Coroutine,
  ProxyPlain,
  ProxyCoroutine,
}

impl FunctionFlavour {
  pub fn is_proxy(self) -> bool {
    matches!(self, FunctionFlavour::ProxyPlain | FunctionFlavour::ProxyCoroutine)
  }

  pub fn is_coroutine(self) -> bool {
    matches!(self, FunctionFlavour::Coroutine | FunctionFlavour::ProxyCoroutine)
  }
}

/// A compile-time-declared capability a request's caller must provide, used to constrain
/// which context types may resolve a given request class.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContextCapability {
  Local,
  Remote,
  Sync,
  Async,
  Caching,
  Introspective,
}

/// Retry policy for a retryable request: up to `max_attempts` tries, with exponential
/// backoff starting at `initial_backoff` and growing by `backoff_multiplier` each attempt.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetryPolicy {
  pub max_attempts: u32,
  pub initial_backoff: Duration,
  pub backoff_multiplier: f64,
}

impl RetryPolicy {
  pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
    let factor = self.backoff_multiplier.powi(attempt as i32);
    self.initial_backoff.mul_f64(factor)
  }
}

/// The properties bundle declared by a request class (§4.3).
#[derive(Clone, Debug)]
pub struct Properties {
  pub caching_level: CachingLevel,
  pub function_flavour: FunctionFlavour,
  pub introspective: bool,
  pub retry_policy: Option<RetryPolicy>,
  pub required_capabilities: Vec<ContextCapability>,
  /// True for a *meta* request (§4.3): its resolved value is itself an encoded request,
  /// which the resolver must decode and resolve in turn rather than returning as-is.
  pub is_meta: bool,
  /// True for the "value-based caching" variant (§4.5): before cache lookup, every
  /// sub-request argument is resolved and substituted by its value, so the fingerprint used
  /// for caching reflects input *values* rather than input *structure*.
  pub value_based_caching: bool,
}

impl Properties {
  pub fn plain() -> Properties {
    Properties {
      caching_level: CachingLevel::None,
      function_flavour: FunctionFlavour::Plain,
      introspective: false,
      retry_policy: None,
      required_capabilities: Vec::new(),
      is_meta: false,
      value_based_caching: false,
    }
  }

  pub fn with_caching_level(mut self, level: CachingLevel) -> Properties {
    self.caching_level = level;
    self
  }

  pub fn with_function_flavour(mut self, flavour: FunctionFlavour) -> Properties {
    self.function_flavour = flavour;
    self
  }

  pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Properties {
    self.retry_policy = Some(policy);
    self
  }

  pub fn with_required_capabilities(mut self, caps: Vec<ContextCapability>) -> Properties {
    self.required_capabilities = caps;
    self
  }

  pub fn introspective(mut self) -> Properties {
    self.introspective = true;
    self
  }

  pub fn meta(mut self) -> Properties {
    self.is_meta = true;
    self
  }

  pub fn value_based_caching(mut self) -> Properties {
    self.value_based_caching = true;
    self
  }

  /// Properties for the trivial wrapper request created by `new_normalized` around a
  /// literal argument: uncached, synchronous, and never itself retried (the outer request's
  /// retry policy governs re-resolution).
  pub(crate) fn literal_passthrough() -> Properties {
    Properties::plain()
  }
}
