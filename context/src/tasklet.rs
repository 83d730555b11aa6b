use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::Mutex;

/// One of the ordered lifecycle events a tasklet passes through (§3 "Tasklet").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskletEvent {
  Scheduled,
  Running,
  BeforeCoAwait,
  AfterCoAwait,
  Finished,
}

pub type TaskletId = u64;

/// An introspection record for one in-flight (or completed) operation: which pool ran it,
/// its title, its parent ("client") tasklet if any, and its ordered event history.
#[derive(Clone, Debug)]
pub struct Tasklet {
  pool_name: String,
  title: Option<String>,
  client_id: Option<TaskletId>,
  events: Vec<(TaskletEvent, Instant)>,
}

impl Tasklet {
  fn new(pool_name: String, title: Option<String>, client_id: Option<TaskletId>) -> Tasklet {
    Tasklet {
      pool_name,
      title,
      client_id,
      events: vec![(TaskletEvent::Scheduled, Instant::now())],
    }
  }

  pub fn pool_name(&self) -> &str {
    &self.pool_name
  }

  pub fn title(&self) -> Option<&str> {
    self.title.as_deref()
  }

  pub fn client_id(&self) -> Option<TaskletId> {
    self.client_id
  }

  pub fn events(&self) -> &[(TaskletEvent, Instant)] {
    &self.events
  }

  pub fn is_finished(&self) -> bool {
    matches!(self.events.last(), Some((TaskletEvent::Finished, _)))
  }

  fn record(&mut self, event: TaskletEvent) {
    self.events.push((event, Instant::now()));
  }
}

/// A process-global (or test-scoped) table of tasklets, created eagerly at schedule time and
/// retained after completion for diagnostic queries (§3).
pub struct TaskletRegistry {
  next_id: AtomicU64,
  tasklets: Mutex<HashMap<TaskletId, Tasklet>>,
}

impl TaskletRegistry {
  pub fn new() -> TaskletRegistry {
    TaskletRegistry {
      next_id: AtomicU64::new(1),
      tasklets: Mutex::new(HashMap::new()),
    }
  }

  /// Eagerly creates a tasklet in the `Scheduled` state and returns its id.
  pub fn schedule(
    &self,
    pool_name: impl Into<String>,
    title: Option<String>,
    client_id: Option<TaskletId>,
  ) -> TaskletId {
    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
    self
      .tasklets
      .lock()
      .insert(id, Tasklet::new(pool_name.into(), title, client_id));
    id
  }

  pub fn record(&self, id: TaskletId, event: TaskletEvent) {
    if let Some(tasklet) = self.tasklets.lock().get_mut(&id) {
      tasklet.record(event);
    }
  }

  pub fn get(&self, id: TaskletId) -> Option<Tasklet> {
    self.tasklets.lock().get(&id).cloned()
  }

  pub fn len(&self) -> usize {
    self.tasklets.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

impl Default for TaskletRegistry {
  fn default() -> Self {
    TaskletRegistry::new()
  }
}
