//! Client live query
//!
//! A `LiveQuery` holds the compiled commands of one subscription together
//! with the last reply of every executed command. A refresh re-executes the
//! nested commands of every top-level command, plus any top-level command
//! marked dirty, then re-assembles the whole result from the cached replies.
//!
//! Once `cleanup` has run the subscription is killed: results that arrive
//! afterwards are dropped and the markers they registered are removed again.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use futures_util::future::try_join_all;
use serde_json::Value;
use tokio::sync::Mutex;

use super::boundary;
use super::errors::SubscriptionResult;
use crate::compiler::{Command, CompiledQuery};
use crate::decoder::ResultDecoder;
use crate::executor::{CommandExecutor, CommandOutput, ExecContext, Marker};
use crate::observability::{log_event_with_fields, Event, Logger};

struct LiveState {
    outputs: Vec<CommandOutput>,
    markers: Vec<Marker>,
    /// Command ids of the inline-reference shadows of the last assembly
    shadow_ids: HashSet<u64>,
    value: Value,
}

pub struct LiveQuery {
    sub_id: String,
    compiled: CompiledQuery,
    ctx: ExecContext,
    decoder: Arc<ResultDecoder>,
    state: Mutex<LiveState>,
    fetching: Mutex<()>,
    dirty: StdMutex<HashSet<u64>>,
    killed: AtomicBool,
}

fn collect_nested<'a>(command: &'a Command, out: &mut Vec<&'a Command>) {
    out.push(command);
    for nested in &command.nested_commands {
        collect_nested(nested, out);
    }
}

/// Removes every marker `executor` registered; used when a result is abandoned
async fn discard_markers(executor: &CommandExecutor) {
    for marker in executor.context().take_markers() {
        executor.remove_marker(&marker).await;
    }
}

impl LiveQuery {
    /// Runs the initial pass in subscription mode
    pub async fn start(
        ctx: &ExecContext,
        sub_id: impl Into<String>,
        compiled: CompiledQuery,
        decoder: Arc<ResultDecoder>,
    ) -> SubscriptionResult<Self> {
        let sub_id = sub_id.into();
        let ctx = ctx.with_sub_id(sub_id.clone());
        let executor = CommandExecutor::new(ctx.fresh());

        let outputs = match executor.execute_all(&compiled.commands).await {
            Ok(outputs) => outputs,
            Err(e) => {
                discard_markers(&executor).await;
                return Err(e.into());
            }
        };
        let decoded = match decoder.assemble(&outputs) {
            Ok(decoded) => decoded,
            Err(e) => {
                discard_markers(&executor).await;
                return Err(e.into());
            }
        };
        for shadow in &decoded.shadows {
            if let Err(e) = executor.register_shadow(shadow).await {
                discard_markers(&executor).await;
                return Err(e.into());
            }
        }

        let markers = executor.context().take_markers();
        let count = markers.len().to_string();
        log_event_with_fields(
            Event::SubscriptionStarted,
            &[("markers", count.as_str()), ("sub_id", sub_id.as_str())],
        );

        Ok(Self {
            sub_id,
            compiled,
            ctx,
            decoder,
            state: Mutex::new(LiveState {
                outputs,
                markers,
                shadow_ids: decoded.shadows.iter().map(|c| c.cmd_id).collect(),
                value: decoded.value,
            }),
            fetching: Mutex::new(()),
            dirty: StdMutex::new(HashSet::new()),
            killed: AtomicBool::new(false),
        })
    }

    pub fn sub_id(&self) -> &str {
        &self.sub_id
    }

    pub fn compiled(&self) -> &CompiledQuery {
        &self.compiled
    }

    pub fn is_killed(&self) -> bool {
        self.killed.load(Ordering::SeqCst)
    }

    /// Current assembled result
    pub async fn value(&self) -> Value {
        self.state.lock().await.value.clone()
    }

    /// Markers currently registered for this subscription
    pub async fn markers(&self) -> Vec<Marker> {
        self.state.lock().await.markers.clone()
    }

    /// Schedules a top-level command for re-execution on the next fetch
    pub fn mark_dirty(&self, cmd_id: u64) {
        if let Ok(mut dirty) = self.dirty.lock() {
            dirty.insert(cmd_id);
        }
    }

    fn take_dirty(&self) -> HashSet<u64> {
        self.dirty
            .lock()
            .map(|mut d| std::mem::take(&mut *d))
            .unwrap_or_default()
    }

    fn restore_dirty(&self, ids: HashSet<u64>) {
        if let Ok(mut dirty) = self.dirty.lock() {
            dirty.extend(ids);
        }
    }

    /// Refreshes the result; `None` once the subscription is killed
    pub async fn fetch(&self) -> SubscriptionResult<Option<Value>> {
        if self.is_killed() {
            return Ok(None);
        }
        let _serial = self.fetching.lock().await;

        let dirty = self.take_dirty();
        let mut run: Vec<&Command> = Vec::new();
        for top in &self.compiled.commands {
            if dirty.contains(&top.cmd_id) {
                collect_nested(top, &mut run);
            } else {
                for nested in &top.nested_commands {
                    collect_nested(nested, &mut run);
                }
            }
        }

        let executor = CommandExecutor::new(self.ctx.fresh());
        let outputs = match try_join_all(run.iter().map(|c| executor.execute(c))).await {
            Ok(outputs) => outputs,
            Err(e) => {
                discard_markers(&executor).await;
                self.restore_dirty(dirty);
                return Err(e.into());
            }
        };

        // Only fetch replaces outputs, and fetches are serialized
        let mut next_outputs = self.state.lock().await.outputs.clone();
        for output in outputs {
            if let Some(slot) = next_outputs
                .iter_mut()
                .find(|o| o.cmd_id == output.cmd_id && o.target == output.target)
            {
                *slot = output;
            }
        }
        let decoded = match self.decoder.assemble(&next_outputs) {
            Ok(decoded) => decoded,
            Err(e) => {
                discard_markers(&executor).await;
                self.restore_dirty(dirty);
                return Err(e.into());
            }
        };
        for shadow in &decoded.shadows {
            if let Err(e) = executor.register_shadow(shadow).await {
                discard_markers(&executor).await;
                self.restore_dirty(dirty);
                return Err(e.into());
            }
        }

        let mut state = self.state.lock().await;
        if self.is_killed() {
            drop(state);
            self.drop_result(&executor).await;
            return Ok(None);
        }

        let fresh = executor.context().take_markers();
        let rerun: HashSet<u64> = run
            .iter()
            .flat_map(|c| c.walk())
            .map(|c| c.cmd_id)
            .collect();
        let old_shadows = std::mem::take(&mut state.shadow_ids);
        let (refreshed, kept): (Vec<Marker>, Vec<Marker>) = std::mem::take(&mut state.markers)
            .into_iter()
            .partition(|m| rerun.contains(&m.cmd_id) || old_shadows.contains(&m.cmd_id));
        let stale: Vec<Marker> = refreshed.into_iter().filter(|m| !fresh.contains(m)).collect();

        let mut markers = kept;
        for marker in fresh {
            if !markers.contains(&marker) {
                markers.push(marker);
            }
        }
        state.markers = markers;
        state.shadow_ids = decoded.shadows.iter().map(|c| c.cmd_id).collect();
        state.outputs = next_outputs;
        state.value = decoded.value.clone();
        drop(state);

        for marker in &stale {
            executor.remove_marker(marker).await;
        }

        self.ctx.metrics.increment_refreshes();
        let commands = run.len().to_string();
        let removed = stale.len().to_string();
        Logger::info(
            Event::SubscriptionRefreshed.as_str(),
            &[
                ("commands", commands.as_str()),
                ("stale_markers", removed.as_str()),
                ("sub_id", self.sub_id.as_str()),
            ],
        );
        Ok(Some(decoded.value))
    }

    async fn drop_result(&self, executor: &CommandExecutor) {
        self.ctx.metrics.increment_results_dropped();
        log_event_with_fields(
            Event::SubscriptionResultDropped,
            &[("sub_id", self.sub_id.as_str())],
        );
        discard_markers(executor).await;
    }

    /// Smallest instant after which a now-relative filter changes the result
    pub async fn next_refresh(&self, now_ms: i64) -> SubscriptionResult<Option<i64>> {
        let candidates = {
            let state = self.state.lock().await;
            let compiled = self.compiled.commands.iter().flat_map(Command::walk);
            boundary::time_sensitive(compiled.chain(state.outputs.iter().map(|o| &o.command)))
        };
        let executor = CommandExecutor::new(self.ctx.fresh().without_sub_id());
        boundary::next_refresh(&executor, &candidates, now_ms).await
    }

    /// Kills the subscription and removes every marker; failures are logged only
    pub async fn cleanup(&self) {
        if self.killed.swap(true, Ordering::SeqCst) {
            return;
        }
        let markers = std::mem::take(&mut self.state.lock().await.markers);
        let executor = CommandExecutor::new(self.ctx.fresh());
        let mut failed = 0usize;
        for marker in &markers {
            if !executor.remove_marker(marker).await {
                failed += 1;
            }
        }
        let removed = (markers.len() - failed).to_string();
        let failed = failed.to_string();
        log_event_with_fields(
            Event::SubscriptionClosed,
            &[
                ("failed", failed.as_str()),
                ("removed", removed.as_str()),
                ("sub_id", self.sub_id.as_str()),
            ],
        );
    }
}

impl Drop for LiveQuery {
    fn drop(&mut self) {
        if self.killed.swap(true, Ordering::SeqCst) {
            return;
        }
        let markers = std::mem::take(&mut self.state.get_mut().markers);
        if markers.is_empty() {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let executor = CommandExecutor::new(self.ctx.fresh());
        runtime.spawn(async move {
            for marker in &markers {
                executor.remove_marker(marker).await;
            }
        });
    }
}

impl std::fmt::Debug for LiveQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveQuery")
            .field("sub_id", &self.sub_id)
            .field("commands", &self.compiled.commands.len())
            .field("killed", &self.is_killed())
            .finish()
    }
}
