//! Public entry points
//!
//! `get` runs one compile, execute and assemble pass. `sub` runs the same
//! pass in subscription mode and hands back a `LiveQuery` that keeps the
//! result current.

use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

use super::errors::{ClientError, ClientResult};
use crate::bridge::{ExpressionBridge, RpnBridge};
use crate::compiler::{CompiledQuery, QueryCompiler};
use crate::config::ClientConfig;
use crate::decoder::ResultDecoder;
use crate::executor::{CommandExecutor, ExecContext};
use crate::observability::{log_event_with_fields, Event, MetricsRegistry, ObservationScope};
use crate::schema::Schema;
use crate::store::Store;
use crate::subscription::LiveQuery;

pub struct Client {
    ctx: ExecContext,
    compiler: QueryCompiler,
    decoder: Arc<ResultDecoder>,
    config: ClientConfig,
}

impl Client {
    /// Client using the reference RPN bridge
    pub fn new(store: Arc<dyn Store>, schema: Arc<Schema>, config: ClientConfig) -> Self {
        Self::with_bridge(store, schema, Arc::new(RpnBridge::new()), config)
    }

    pub fn with_bridge(
        store: Arc<dyn Store>,
        schema: Arc<Schema>,
        bridge: Arc<dyn ExpressionBridge>,
        config: ClientConfig,
    ) -> Self {
        let ctx = ExecContext::new(
            store,
            Arc::clone(&schema),
            bridge,
            Arc::new(MetricsRegistry::new()),
            config.default_language.clone(),
        );
        Self {
            ctx,
            compiler: QueryCompiler::new(Arc::clone(&schema)),
            decoder: Arc::new(ResultDecoder::new(schema)),
            config,
        }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        self.compiler.schema()
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.ctx.metrics
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Fresh per-call context in the query's language
    fn context_for(&self, query: &Value) -> ExecContext {
        let lang = query
            .get("$language")
            .and_then(Value::as_str)
            .unwrap_or(self.config.default_language.as_str());
        self.ctx.fresh().with_lang(lang)
    }

    async fn compile(&self, ctx: &ExecContext, query: &Value) -> ClientResult<CompiledQuery> {
        match self.compiler.compile(query, &ctx.alias_resolver()).await {
            Ok(compiled) => {
                self.ctx.metrics.increment_queries_compiled();
                let commands = compiled.commands.len().to_string();
                log_event_with_fields(
                    Event::QueryCompiled,
                    &[("commands", commands.as_str()), ("lang", ctx.lang.as_str())],
                );
                Ok(compiled)
            }
            Err(e) => {
                self.ctx.metrics.increment_queries_rejected();
                let reason = e.to_string();
                log_event_with_fields(
                    Event::QueryRejected,
                    &[("code", e.code()), ("reason", reason.as_str())],
                );
                Err(e.into())
            }
        }
    }

    /// Reads `query` once
    pub async fn get(&self, query: &Value) -> ClientResult<Value> {
        let scope = ObservationScope::new("GET");
        match self.run_get(query).await {
            Ok((value, commands)) => {
                let commands = commands.to_string();
                scope.complete_with_fields(&[("commands", commands.as_str())]);
                Ok(value)
            }
            Err(e) => {
                scope.fail(e.code());
                Err(e)
            }
        }
    }

    async fn run_get(&self, query: &Value) -> ClientResult<(Value, usize)> {
        let ctx = self.context_for(query);
        let compiled = self.compile(&ctx, query).await?;
        let executor = CommandExecutor::new(ctx);
        let outputs = executor.execute_all(&compiled.commands).await?;
        let decoded = self.decoder.assemble(&outputs)?;
        Ok((decoded.value, outputs.len()))
    }

    /// Subscribes to `query`; the initial result is `LiveQuery::value`
    pub async fn sub(&self, query: &Value) -> ClientResult<LiveQuery> {
        let sub_id = self.new_sub_id();
        let scope = ObservationScope::with_fields("SUB", &[("sub_id", sub_id.as_str())]);
        let result: ClientResult<LiveQuery> = async {
            let ctx = self.context_for(query);
            let compiled = self.compile(&ctx, query).await?;
            LiveQuery::start(&ctx, sub_id.clone(), compiled, Arc::clone(&self.decoder))
                .await
                .map_err(ClientError::from)
        }
        .await;
        match &result {
            Ok(_) => scope.complete(),
            Err(e) => scope.fail(e.code()),
        }
        result
    }

    fn new_sub_id(&self) -> String {
        format!("{}-{}", self.config.subscription_prefix, Uuid::new_v4())
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("default_language", &self.config.default_language)
            .field("types", &self.schema().types.len())
            .finish()
    }
}
