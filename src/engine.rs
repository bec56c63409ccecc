//! Generic resource engine: uniform CRUD over a registered collection.
//!
//! Every operation follows the same pipeline: extract identity, build and
//! narrow the filter, execute the storage operation, run the post hook,
//! format the envelope. Behavior is customized per entity through an
//! injected [`ResourceHooks`] strategy, never by subclassing the engine.
//! Failures never escape unformatted: each public operation converts its
//! error into an operation/collection-scoped fail envelope.

use async_trait::async_trait;
use axum::http::{HeaderMap, Method, StatusCode};
use axum::Json;
use chrono::Utc;
use futures_util::future::BoxFuture;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::auth::Identity;
use crate::error::AppError;
use crate::query::{self, ListQuery};
use crate::response::{self, Envelope, Operation, PageInfo};
use crate::state::AppState;
use crate::store::{DocumentStore, FindOptions};

/// Identity handoff headers set by the router after authentication. The
/// sole channel between router and engine.
pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

pub type ApiReply = (StatusCode, Json<Envelope>);

/// Request-scoped inputs an operation needs: headers (identity handoff),
/// parsed query pairs, and the JSON body when present.
#[derive(Clone, Debug, Default)]
pub struct RequestContext {
    pub headers: HeaderMap,
    pub query: HashMap<String, String>,
    pub body: Option<Value>,
}

impl RequestContext {
    /// The caller identity attached by the router, if any.
    pub fn identity(&self) -> Option<Identity> {
        let id = self.headers.get(USER_ID_HEADER)?.to_str().ok()?.to_string();
        let role = self
            .headers
            .get(USER_ROLE_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|r| !r.is_empty())
            .map(String::from);
        Some(Identity {
            id,
            email: None,
            name: None,
            role,
        })
    }
}

/// Per-entity extension points, all defaulting to no-ops. `pre_save` may
/// mutate the payload before the write (hash a password, derive fields);
/// `post_save` sees the written (or deleted) document; `scope_filter`
/// narrows which documents a caller may touch. The engine applies no
/// row-level restriction itself; entities opt into tightening.
#[async_trait]
pub trait ResourceHooks: Send + Sync {
    async fn pre_save(
        &self,
        _store: &dyn DocumentStore,
        _data: &mut Map<String, Value>,
        _op: Operation,
        _user: Option<&Identity>,
    ) -> Result<(), AppError> {
        Ok(())
    }

    async fn post_save(
        &self,
        _store: &dyn DocumentStore,
        _doc: &mut Value,
        _op: Operation,
        _user: Option<&Identity>,
    ) -> Result<(), AppError> {
        Ok(())
    }

    async fn scope_filter(
        &self,
        _filter: &mut Map<String, Value>,
        _user: Option<&Identity>,
    ) -> Result<(), AppError> {
        Ok(())
    }
}

/// The permissive default hook set.
pub struct NoHooks;

#[async_trait]
impl ResourceHooks for NoHooks {}

/// Sub-resource handler: a named action under a specific entity instance,
/// registered explicitly per resource (no reflective method lookup).
pub type SubResourceFn = for<'a> fn(
    &'a AppState,
    &'a RequestContext,
    &'a Resource,
    &'a str,
    &'a Method,
) -> BoxFuture<'a, ApiReply>;

/// One registered collection: canonical name, human label, searchable text
/// fields, hook strategy, and sub-resource table.
pub struct Resource {
    pub name: String,
    pub label: String,
    pub searchable_fields: Vec<String>,
    pub hooks: Arc<dyn ResourceHooks>,
    pub sub_resources: HashMap<&'static str, SubResourceFn>,
}

impl Resource {
    pub fn new(name: &str, label: &str, searchable_fields: &[&str]) -> Self {
        Resource {
            name: name.to_string(),
            label: label.to_string(),
            searchable_fields: searchable_fields.iter().map(|f| f.to_string()).collect(),
            hooks: Arc::new(NoHooks),
            sub_resources: HashMap::new(),
        }
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn ResourceHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_sub_resource(mut self, name: &'static str, handler: SubResourceFn) -> Self {
        self.sub_resources.insert(name, handler);
        self
    }

    fn translate(&self, ctx: &RequestContext) -> ListQuery {
        query::translate(&ctx.query, &self.searchable_fields)
    }

    fn reply(result: Result<(StatusCode, Envelope), AppError>, op: Operation, label: &str) -> ApiReply {
        match result {
            Ok((status, envelope)) => (status, Json(envelope)),
            Err(err) => {
                tracing::warn!(collection = label, op = op.label(), error = %err, "operation failed");
                (err.status_code(), Json(response::operation_failed(&err, op, label)))
            }
        }
    }

    fn body_object(ctx: &RequestContext) -> Result<Map<String, Value>, AppError> {
        match &ctx.body {
            Some(Value::Object(m)) => Ok(m.clone()),
            _ => Err(AppError::BadRequest("body must be a JSON object".into())),
        }
    }

    pub async fn get_all(&self, store: &dyn DocumentStore, ctx: &RequestContext) -> ApiReply {
        let op = Operation::GetAll;
        Self::reply(self.try_get_all(store, ctx).await, op, &self.label)
    }

    async fn try_get_all(
        &self,
        store: &dyn DocumentStore,
        ctx: &RequestContext,
    ) -> Result<(StatusCode, Envelope), AppError> {
        let user = ctx.identity();
        let mut q = self.translate(ctx);
        self.hooks.scope_filter(&mut q.filter, user.as_ref()).await?;

        let mut options = FindOptions {
            sort: Some(q.sort.clone()),
            select: q.select.clone(),
            populate: q.populate.clone(),
            ..Default::default()
        };

        if let Some(page) = &q.pagination {
            options.skip = Some(page.skip());
            options.limit = Some(page.limit);
            // count and page fetch target disjoint outputs; run them jointly
            let (rows, total) = tokio::join!(
                store.find(&self.name, &q.filter, &options),
                store.count(&self.name, &q.filter)
            );
            let (rows, total) = (rows?, total?);
            let info = PageInfo::new(page.page, page.limit, total);
            return Ok((
                StatusCode::OK,
                response::success_paginated(Value::Array(rows), 200, Operation::GetAll, &self.label, info),
            ));
        }

        let rows = store.find(&self.name, &q.filter, &options).await?;
        Ok((
            StatusCode::OK,
            response::success(Value::Array(rows), 200, Operation::GetAll, &self.label),
        ))
    }

    pub async fn get_by_id(
        &self,
        store: &dyn DocumentStore,
        ctx: &RequestContext,
        id: &str,
    ) -> ApiReply {
        let op = Operation::GetById;
        Self::reply(self.try_get_by_id(store, ctx, id).await, op, &self.label)
    }

    async fn try_get_by_id(
        &self,
        store: &dyn DocumentStore,
        ctx: &RequestContext,
        id: &str,
    ) -> Result<(StatusCode, Envelope), AppError> {
        let user = ctx.identity();
        let q = self.translate(ctx);
        let mut filter = query::id_filter(id);
        self.hooks.scope_filter(&mut filter, user.as_ref()).await?;
        let options = FindOptions {
            select: q.select.clone(),
            populate: q.populate.clone(),
            ..Default::default()
        };
        let doc = store
            .find_one(&self.name, &filter, &options)
            .await?
            .ok_or_else(|| AppError::NotFound(self.name.clone()))?;
        Ok((
            StatusCode::OK,
            response::success(doc, 200, Operation::GetById, &self.label),
        ))
    }

    pub async fn create(&self, store: &dyn DocumentStore, ctx: &RequestContext) -> ApiReply {
        let op = Operation::Create;
        Self::reply(self.try_create(store, ctx).await, op, &self.label)
    }

    async fn try_create(
        &self,
        store: &dyn DocumentStore,
        ctx: &RequestContext,
    ) -> Result<(StatusCode, Envelope), AppError> {
        let user = ctx.identity();
        let mut data = Self::body_object(ctx)?;
        let now = Utc::now().to_rfc3339();
        data.entry("createdAt".to_string())
            .or_insert_with(|| Value::String(now.clone()));
        data.insert("updatedAt".to_string(), Value::String(now));
        self.hooks
            .pre_save(store, &mut data, Operation::Create, user.as_ref())
            .await?;
        let mut doc = store.insert_one(&self.name, data).await?;
        self.hooks
            .post_save(store, &mut doc, Operation::Create, user.as_ref())
            .await?;
        Ok((
            StatusCode::CREATED,
            response::success(doc, 201, Operation::Create, &self.label),
        ))
    }

    pub async fn update_by_id(
        &self,
        store: &dyn DocumentStore,
        ctx: &RequestContext,
        id: &str,
    ) -> ApiReply {
        let op = Operation::Update;
        Self::reply(self.try_update_by_id(store, ctx, id).await, op, &self.label)
    }

    async fn try_update_by_id(
        &self,
        store: &dyn DocumentStore,
        ctx: &RequestContext,
        id: &str,
    ) -> Result<(StatusCode, Envelope), AppError> {
        let user = ctx.identity();
        let mut data = Self::body_object(ctx)?;
        data.insert("id".to_string(), Value::String(id.to_string()));
        self.hooks
            .pre_save(store, &mut data, Operation::Update, user.as_ref())
            .await?;
        data.remove("id");
        data.insert("updatedAt".to_string(), Value::String(Utc::now().to_rfc3339()));

        let mut filter = query::id_filter(id);
        self.hooks.scope_filter(&mut filter, user.as_ref()).await?;
        // not-found and out-of-scope are indistinguishable on purpose
        let mut doc = store
            .update_one(&self.name, &filter, &data)
            .await?
            .ok_or_else(|| AppError::NotFound(self.name.clone()))?;
        self.hooks
            .post_save(store, &mut doc, Operation::Update, user.as_ref())
            .await?;
        Ok((
            StatusCode::OK,
            response::success(doc, 200, Operation::Update, &self.label),
        ))
    }

    pub async fn delete_by_id(
        &self,
        store: &dyn DocumentStore,
        ctx: &RequestContext,
        id: &str,
    ) -> ApiReply {
        let op = Operation::Delete;
        Self::reply(self.try_delete_by_id(store, ctx, id).await, op, &self.label)
    }

    async fn try_delete_by_id(
        &self,
        store: &dyn DocumentStore,
        ctx: &RequestContext,
        id: &str,
    ) -> Result<(StatusCode, Envelope), AppError> {
        let user = ctx.identity();
        let mut data = Map::new();
        data.insert("id".to_string(), Value::String(id.to_string()));
        // audit hook runs before the delete
        self.hooks
            .pre_save(store, &mut data, Operation::Delete, user.as_ref())
            .await?;
        let mut filter = query::id_filter(id);
        self.hooks.scope_filter(&mut filter, user.as_ref()).await?;
        let mut doc = store
            .delete_one(&self.name, &filter)
            .await?
            .ok_or_else(|| AppError::NotFound(self.name.clone()))?;
        self.hooks
            .post_save(store, &mut doc, Operation::Delete, user.as_ref())
            .await?;
        Ok((
            StatusCode::OK,
            response::success(doc, 200, Operation::Delete, &self.label),
        ))
    }
}
