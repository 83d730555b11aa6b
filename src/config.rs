use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use containment::ProcessContainedDispatcher;
use cradle_errors::CradleError;
use memory_cache::{MemoryCache, DEFAULT_CAPACITY_BYTES};
use resolver::Resources;
use secondary_cache::SecondaryCache;

const MEMORY_CACHE_UNUSED_SIZE_LIMIT: &str = "MEMORY_CACHE_UNUSED_SIZE_LIMIT";
const SECONDARY_CACHE_FACTORY: &str = "SECONDARY_CACHE_FACTORY";
const DISK_CACHE_DIRECTORY: &str = "DISK_CACHE.DIRECTORY";
const DISK_CACHE_SIZE_LIMIT: &str = "DISK_CACHE.SIZE_LIMIT";
const DISK_CACHE_START_EMPTY: &str = "DISK_CACHE.START_EMPTY";
const HTTP_CONCURRENCY: &str = "HTTP_CONCURRENCY";
const DEPLOY_DIR: &str = "DEPLOY_DIR";
const TESTING: &str = "TESTING";

/// The name of a secondary-cache plug-in this workspace actually implements. Any other
/// `SECONDARY_CACHE_FACTORY` value is rejected at [`Config::build_resources`] time rather
/// than silently falling back, since silently skipping the disk cache would be surprising.
const DISK_SECONDARY_CACHE_FACTORY: &str = "disk";

/// The filename a `DEPLOY_DIR` is expected to carry for the contained-worker subprocess
/// (§4.11); `ProcessContainedDispatcher` is built from `<DEPLOY_DIR>/<this>`.
const CONTAINED_WORKER_BINARY: &str = "cradle-contained-worker";

const DEFAULT_WATCHDOG_TIMEOUT: Duration = Duration::from_secs(30);

/// The typed view over the configuration map from §6: every key a caller may pass at
/// resources construction, with the same defaults the teacher's `options` crate applies when
/// a key is absent from the map (here: compiled-in constants rather than a `.toml`/env
/// hierarchy, since CRADLE takes its whole config as one explicit map).
#[derive(Clone, Debug, Default)]
pub struct Config {
  memory_cache_unused_size_limit: Option<usize>,
  secondary_cache_factory: Option<String>,
  disk_cache_directory: Option<PathBuf>,
  disk_cache_size_limit: Option<u64>,
  disk_cache_start_empty: bool,
  http_concurrency: Option<usize>,
  deploy_dir: Option<PathBuf>,
  testing: bool,
}

impl Config {
  /// Parses a raw string-keyed config map the way a caller would receive it off a CLI flag
  /// or a config file, per §6's "passed in a config map at resources construction".
  pub fn from_map(map: &HashMap<String, String>) -> Result<Config, CradleError> {
    let mut config = Config::default();

    if let Some(raw) = map.get(MEMORY_CACHE_UNUSED_SIZE_LIMIT) {
      config.memory_cache_unused_size_limit = Some(parse_usize(MEMORY_CACHE_UNUSED_SIZE_LIMIT, raw)?);
    }
    if let Some(raw) = map.get(SECONDARY_CACHE_FACTORY) {
      config.secondary_cache_factory = Some(raw.clone());
    }
    if let Some(raw) = map.get(DISK_CACHE_DIRECTORY) {
      config.disk_cache_directory = Some(PathBuf::from(raw));
    }
    if let Some(raw) = map.get(DISK_CACHE_SIZE_LIMIT) {
      config.disk_cache_size_limit = Some(parse_u64(DISK_CACHE_SIZE_LIMIT, raw)?);
    }
    if let Some(raw) = map.get(DISK_CACHE_START_EMPTY) {
      config.disk_cache_start_empty = parse_bool(DISK_CACHE_START_EMPTY, raw)?;
    }
    if let Some(raw) = map.get(HTTP_CONCURRENCY) {
      config.http_concurrency = Some(parse_usize(HTTP_CONCURRENCY, raw)?);
    }
    if let Some(raw) = map.get(DEPLOY_DIR) {
      config.deploy_dir = Some(PathBuf::from(raw));
    }
    if let Some(raw) = map.get(TESTING) {
      config.testing = parse_bool(TESTING, raw)?;
    }

    Ok(config)
  }

  pub fn memory_cache_capacity_bytes(&self) -> usize {
    self.memory_cache_unused_size_limit.unwrap_or(DEFAULT_CAPACITY_BYTES)
  }

  pub fn http_concurrency(&self) -> usize {
    self.http_concurrency.unwrap_or(1)
  }

  pub fn is_testing(&self) -> bool {
    self.testing
  }

  /// Builds the [`Resources`] bundle a [`resolver::Resolver`] runs over: the memory cache
  /// always, the secondary cache when `DISK_CACHE.DIRECTORY` is set (wiping it first if
  /// `DISK_CACHE.START_EMPTY`), and a process-backed containment dispatcher when `DEPLOY_DIR`
  /// names where the contained-worker binary lives (otherwise the loopback stand-in).
  pub fn build_resources(&self) -> Result<Resources, CradleError> {
    let mut resources = Resources::new(MemoryCache::new(self.memory_cache_capacity_bytes()));

    if let Some(dir) = &self.disk_cache_directory {
      let factory = self.secondary_cache_factory.as_deref().unwrap_or(DISK_SECONDARY_CACHE_FACTORY);
      if factory != DISK_SECONDARY_CACHE_FACTORY {
        return Err(CradleError::invalid_argument(format!(
          "unknown {SECONDARY_CACHE_FACTORY} {factory:?}; this workspace only implements {DISK_SECONDARY_CACHE_FACTORY:?}"
        )));
      }
      if self.disk_cache_start_empty && dir.exists() {
        fs::remove_dir_all(dir)
          .map_err(|e| CradleError::logic_error(format!("wiping disk cache dir {dir:?} on start: {e}")))?;
      }
      let capacity = self.disk_cache_size_limit.unwrap_or(u64::from(u32::MAX));
      resources = resources.with_secondary_cache(SecondaryCache::open(dir, capacity)?);
    }

    if let Some(deploy_dir) = &self.deploy_dir {
      let worker_binary = deploy_dir.join(CONTAINED_WORKER_BINARY);
      resources = resources.with_contained_dispatcher(ProcessContainedDispatcher::new(
        worker_binary,
        DEFAULT_WATCHDOG_TIMEOUT,
      ));
    }

    Ok(resources)
  }
}

fn parse_usize(key: &str, raw: &str) -> Result<usize, CradleError> {
  raw.parse().map_err(|_| CradleError::ParsingError {
    expected_format: format!("{key} as an unsigned integer"),
    excerpt: raw.to_string(),
  })
}

fn parse_u64(key: &str, raw: &str) -> Result<u64, CradleError> {
  raw.parse().map_err(|_| CradleError::ParsingError {
    expected_format: format!("{key} as an unsigned integer"),
    excerpt: raw.to_string(),
  })
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, CradleError> {
  match raw {
    "true" | "1" => Ok(true),
    "false" | "0" => Ok(false),
    _ => Err(CradleError::ParsingError {
      expected_format: format!("{key} as a boolean (true/false/1/0)"),
      excerpt: raw.to_string(),
    }),
  }
}
