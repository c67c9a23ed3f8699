//! # Reconciler
//!
//! Implements the four idempotent verbs on top of the context, codec, lock
//! registry, collection merger and poller.
//!
//! | Verb | Native object ([`ResourceReconciler`]) | Collection entry ([`EntryReconciler`]) |
//! |------|----------------------------------------|----------------------------------------|
//! | Create | existence check, write, read back | lock parent, re-read, insert, write back |
//! | Read | fetch; 404 is [`Observed::Gone`] | fetch parent, find by name |
//! | Update | fetch, merge onto remote, write | lock parent, re-read, replace, write back |
//! | Delete | delete; 404 is success | lock parent, re-read, remove, write back |
//!
//! Create never adopts an existing object: it fails with
//! [`ReconcileError::AlreadyExists`] and the object must be imported.
//!
//! Read and Update report an object that vanished out-of-band as
//! [`Observed::Gone`] so the caller drops it from its state instead of
//! failing the whole run.
//!
//! ## Lost updates
//!
//! Entries share their parent's list, and the remote API only accepts the
//! whole list back. Two entry reconcilers writing the same parent from two
//! different snapshots would silently drop one change, so the
//! read-merge-write cycle runs under the parent's [`NamedLock`]. The lock is
//! a guard value: an early return or `?` releases it.
//!
//! [`NamedLock`]: crate::locks::NamedLock

use crate::client::RemoteClient;
use crate::collection::{self, Merge, NamedEntry};
use crate::config::Verb;
use crate::context::ReconcileContext;
use crate::error::{ReconcileError, ReconcileResult};
use crate::identity::ResourceId;
use crate::resource::{CollectionEntry, Resource};
use async_trait::async_trait;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};

/// Result of Read and Update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observed<S> {
    Present(S),
    /// The object no longer exists remotely; drop it from local state.
    Gone,
}

impl<S> Observed<S> {
    pub fn is_gone(&self) -> bool {
        matches!(self, Observed::Gone)
    }

    pub fn present(self) -> Option<S> {
        match self {
            Observed::Present(state) => Some(state),
            Observed::Gone => None,
        }
    }
}

/// The four-verb contract, implemented once per object kind.
///
/// `id` arguments are serialized identities as returned in a previous
/// state; they are parsed with the context's codec.
#[async_trait]
pub trait Reconcile: Send + Sync {
    type Desired: Send + Sync;
    type State: Send;

    async fn create(&self, desired: &Self::Desired) -> ReconcileResult<Self::State>;

    async fn read(&self, id: &str) -> ReconcileResult<Observed<Self::State>>;

    async fn update(&self, id: &str, desired: &Self::Desired) -> ReconcileResult<Observed<Self::State>>;

    async fn delete(&self, id: &str) -> ReconcileResult<()>;
}

fn lock_set(id: &ResourceId, extra: Vec<String>) -> Vec<String> {
    std::iter::once(id.lock_key()).chain(extra).collect()
}

fn removing_from_state(kind: &str, id: &ResourceId) {
    warn!(%id, "{kind} was not found - removing from state");
}

/// Reconciler for a natively addressed object kind.
pub struct ResourceReconciler<R, C> {
    ctx: Arc<ReconcileContext<C>>,
    _kind: PhantomData<fn() -> R>,
}

impl<R, C> Clone for ResourceReconciler<R, C> {
    fn clone(&self) -> Self {
        Self {
            ctx: self.ctx.clone(),
            _kind: PhantomData,
        }
    }
}

impl<R, C> ResourceReconciler<R, C>
where
    R: Resource,
    C: RemoteClient<R::Remote>,
{
    pub fn new(ctx: Arc<ReconcileContext<C>>) -> Self {
        Self {
            ctx,
            _kind: PhantomData,
        }
    }

    pub fn context(&self) -> &ReconcileContext<C> {
        &self.ctx
    }

    fn parse(&self, raw: &str) -> ReconcileResult<ResourceId> {
        let id = self.ctx.codec().parse(raw)?;
        if id.is_synthetic() {
            return Err(ReconcileError::malformed(
                raw,
                format!("{} identities have no synthetic segments", R::KIND),
            ));
        }
        Ok(id)
    }

    async fn read_back(&self, id: &ResourceId, deadline: Instant) -> ReconcileResult<R::State> {
        let remote = self
            .ctx
            .fetch::<R::Remote>(id, deadline)
            .await?
            .ok_or_else(|| ReconcileError::NotFound { id: id.to_string() })?;
        Ok(R::flatten(id, &remote))
    }

    async fn create_object(&self, desired: &R::Desired) -> ReconcileResult<R::State> {
        let ctx = &self.ctx;
        let deadline = ctx.deadline_for(Verb::Create);
        let id = R::identity(ctx.codec(), desired)?;
        debug!(%id, "Create");

        let _locks = ctx.lock_many(lock_set(&id, R::lock_keys(desired)), &id, deadline).await?;
        if ctx.fetch::<R::Remote>(&id, deadline).await?.is_some() {
            warn!(%id, "Already exists");
            return Err(ReconcileError::AlreadyExists { id: id.to_string() });
        }

        ctx.write(&id, R::expand(desired, None), deadline).await?;
        let state = self.read_back(&id, deadline).await?;
        info!(%id, "Created");
        Ok(state)
    }

    async fn read_object(&self, raw: &str) -> ReconcileResult<Observed<R::State>> {
        let id = self.parse(raw)?;
        let deadline = self.ctx.deadline_for(Verb::Read);

        match self.ctx.fetch::<R::Remote>(&id, deadline).await? {
            Some(remote) => Ok(Observed::Present(R::flatten(&id, &remote))),
            None => {
                removing_from_state(R::KIND, &id);
                Ok(Observed::Gone)
            }
        }
    }

    async fn update_object(&self, raw: &str, desired: &R::Desired) -> ReconcileResult<Observed<R::State>> {
        let ctx = &self.ctx;
        let id = self.parse(raw)?;
        let deadline = ctx.deadline_for(Verb::Update);
        debug!(%id, "Update");

        let _locks = ctx.lock_many(lock_set(&id, R::lock_keys(desired)), &id, deadline).await?;
        let Some(existing) = ctx.fetch::<R::Remote>(&id, deadline).await? else {
            removing_from_state(R::KIND, &id);
            return Ok(Observed::Gone);
        };

        ctx.write(&id, R::expand(desired, Some(existing)), deadline).await?;
        let state = self.read_back(&id, deadline).await?;
        info!(%id, "Updated");
        Ok(Observed::Present(state))
    }

    async fn delete_object(&self, raw: &str) -> ReconcileResult<()> {
        let ctx = &self.ctx;
        let id = self.parse(raw)?;
        let deadline = ctx.deadline_for(Verb::Delete);

        let _lock = ctx.lock(&id.lock_key(), &id, deadline).await?;
        ctx.remove::<R::Remote>(&id, deadline).await?;
        info!(%id, "Deleted");
        Ok(())
    }
}

#[async_trait]
impl<R, C> Reconcile for ResourceReconciler<R, C>
where
    R: Resource,
    C: RemoteClient<R::Remote> + 'static,
{
    type Desired = R::Desired;
    type State = R::State;

    async fn create(&self, desired: &R::Desired) -> ReconcileResult<R::State> {
        let span = info_span!("create", kind = R::KIND);
        self.create_object(desired).instrument(span).await
    }

    async fn read(&self, id: &str) -> ReconcileResult<Observed<R::State>> {
        let span = info_span!("read", kind = R::KIND, %id);
        self.read_object(id).instrument(span).await
    }

    async fn update(&self, id: &str, desired: &R::Desired) -> ReconcileResult<Observed<R::State>> {
        let span = info_span!("update", kind = R::KIND, %id);
        self.update_object(id, desired).instrument(span).await
    }

    async fn delete(&self, id: &str) -> ReconcileResult<()> {
        let span = info_span!("delete", kind = R::KIND, %id);
        self.delete_object(id).instrument(span).await
    }
}

/// Outcome of one locked read-merge-write cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Modification {
    Written,
    Unchanged,
    ParentGone,
}

/// Reconciler for a named entry inside a parent's list field.
pub struct EntryReconciler<E, C> {
    ctx: Arc<ReconcileContext<C>>,
    _kind: PhantomData<fn() -> E>,
}

impl<E, C> Clone for EntryReconciler<E, C> {
    fn clone(&self) -> Self {
        Self {
            ctx: self.ctx.clone(),
            _kind: PhantomData,
        }
    }
}

impl<E, C> EntryReconciler<E, C>
where
    E: CollectionEntry,
    C: RemoteClient<E::Parent>,
{
    pub fn new(ctx: Arc<ReconcileContext<C>>) -> Self {
        Self {
            ctx,
            _kind: PhantomData,
        }
    }

    pub fn context(&self) -> &ReconcileContext<C> {
        &self.ctx
    }

    /// Splits a serialized entry identity into (entry, parent, entry name).
    fn parse(&self, raw: &str) -> ReconcileResult<(ResourceId, ResourceId, String)> {
        let id = self.ctx.codec().parse(raw)?;
        let single_marker = matches!(
            id.synthetic_segments(),
            [segment] if segment.kind.eq_ignore_ascii_case(E::MARKER)
        );
        if !single_marker {
            return Err(ReconcileError::malformed(
                raw,
                format!("expected exactly one {} segment", E::MARKER),
            ));
        }
        let (parent, name) = id
            .split_synthetic()
            .map(|(parent, name)| (parent, name.to_string()))
            .ok_or_else(|| ReconcileError::malformed(raw, "missing discriminator"))?;
        Ok((id, parent, name))
    }

    fn parent_of(&self, desired: &E::Desired) -> ReconcileResult<ResourceId> {
        let parent = E::parent_identity(self.ctx.codec(), desired)?;
        if parent.is_synthetic() {
            return Err(ReconcileError::malformed(
                &parent.to_string(),
                "the parent of a collection entry must be a native identity",
            ));
        }
        Ok(parent)
    }

    /// Locks the parent, re-reads it, applies `merge` and writes the whole
    /// collection back.
    async fn modify(
        &self,
        parent_id: &ResourceId,
        merge: Merge<E::Entry>,
        deadline: Instant,
    ) -> ReconcileResult<Modification> {
        let ctx = &self.ctx;
        let _lock = ctx.lock(&parent_id.lock_key(), parent_id, deadline).await?;

        let Some(mut parent) = ctx.fetch::<E::Parent>(parent_id, deadline).await? else {
            return Ok(Modification::ParentGone);
        };
        let target = merge.target().to_string();
        let Some(entries) = merge.apply(E::entries(&parent))? else {
            return Ok(Modification::Unchanged);
        };

        debug!(parent = %parent_id, entry = %target, entries = entries.len(), "Writing collection");
        E::set_entries(&mut parent, entries);
        ctx.write(parent_id, parent, deadline).await?;
        Ok(Modification::Written)
    }

    async fn find(
        &self,
        id: &ResourceId,
        parent_id: &ResourceId,
        name: &str,
        deadline: Instant,
    ) -> ReconcileResult<Option<E::State>> {
        let Some(parent) = self.ctx.fetch::<E::Parent>(parent_id, deadline).await? else {
            return Ok(None);
        };
        let entries = E::entries(&parent);
        Ok(collection::find(&entries, name).map(|(_, entry)| E::flatten(id, &parent, entry)))
    }

    async fn create_entry(&self, desired: &E::Desired) -> ReconcileResult<E::State> {
        let deadline = self.ctx.deadline_for(Verb::Create);
        let parent_id = self.parent_of(desired)?;
        let entry = E::expand(desired);
        let name = entry.name().to_string();
        let id = self.ctx.codec().synthesize(&parent_id, E::MARKER, &name)?;
        debug!(%id, "Create");

        match self.modify(&parent_id, Merge::Insert(entry), deadline).await {
            Ok(Modification::Written | Modification::Unchanged) => {}
            Ok(Modification::ParentGone) => {
                return Err(ReconcileError::NotFound {
                    id: parent_id.to_string(),
                })
            }
            Err(ReconcileError::DuplicateEntry { .. }) => {
                warn!(%id, "Already exists");
                return Err(ReconcileError::AlreadyExists { id: id.to_string() });
            }
            Err(e) => return Err(e),
        }

        let state = self
            .find(&id, &parent_id, &name, deadline)
            .await?
            .ok_or_else(|| ReconcileError::NotFound { id: id.to_string() })?;
        info!(%id, "Created");
        Ok(state)
    }

    async fn read_entry(&self, raw: &str) -> ReconcileResult<Observed<E::State>> {
        let (id, parent_id, name) = self.parse(raw)?;
        let deadline = self.ctx.deadline_for(Verb::Read);

        match self.find(&id, &parent_id, &name, deadline).await? {
            Some(state) => Ok(Observed::Present(state)),
            None => {
                removing_from_state(E::KIND, &id);
                Ok(Observed::Gone)
            }
        }
    }

    async fn update_entry(&self, raw: &str, desired: &E::Desired) -> ReconcileResult<Observed<E::State>> {
        let (id, parent_id, name) = self.parse(raw)?;
        let deadline = self.ctx.deadline_for(Verb::Update);
        let entry = E::expand(desired);
        let new_name = entry.name().to_string();
        let new_id = self.ctx.codec().synthesize(&parent_id, E::MARKER, &new_name)?;
        debug!(%id, "Update");

        match self.modify(&parent_id, Merge::Update { name, entry }, deadline).await {
            Ok(Modification::Written | Modification::Unchanged) => {}
            Ok(Modification::ParentGone) | Err(ReconcileError::EntryNotFound { .. }) => {
                removing_from_state(E::KIND, &id);
                return Ok(Observed::Gone);
            }
            Err(e) => return Err(e),
        }

        let state = self
            .find(&new_id, &parent_id, &new_name, deadline)
            .await?
            .ok_or_else(|| ReconcileError::NotFound { id: new_id.to_string() })?;
        info!(id = %new_id, "Updated");
        Ok(Observed::Present(state))
    }

    async fn delete_entry(&self, raw: &str) -> ReconcileResult<()> {
        let (id, parent_id, name) = self.parse(raw)?;
        let deadline = self.ctx.deadline_for(Verb::Delete);

        match self.modify(&parent_id, Merge::Remove { name }, deadline).await? {
            Modification::Written => info!(%id, "Deleted"),
            Modification::Unchanged | Modification::ParentGone => debug!(%id, "Already gone"),
        }
        Ok(())
    }
}

#[async_trait]
impl<E, C> Reconcile for EntryReconciler<E, C>
where
    E: CollectionEntry,
    C: RemoteClient<E::Parent> + 'static,
{
    type Desired = E::Desired;
    type State = E::State;

    async fn create(&self, desired: &E::Desired) -> ReconcileResult<E::State> {
        let span = info_span!("create", kind = E::KIND);
        self.create_entry(desired).instrument(span).await
    }

    async fn read(&self, id: &str) -> ReconcileResult<Observed<E::State>> {
        let span = info_span!("read", kind = E::KIND, %id);
        self.read_entry(id).instrument(span).await
    }

    async fn update(&self, id: &str, desired: &E::Desired) -> ReconcileResult<Observed<E::State>> {
        let span = info_span!("update", kind = E::KIND, %id);
        self.update_entry(id, desired).instrument(span).await
    }

    async fn delete(&self, id: &str) -> ReconcileResult<()> {
        let span = info_span!("delete", kind = E::KIND, %id);
        self.delete_entry(id).instrument(span).await
    }
}
