//! Payload extraction: caller values to template variables plus chat history.
//!
//! A payload type declares once, via [`PromptPayload::describe`], which of
//! its fields map to which template variables. The resulting
//! [`PayloadSchema`] is built on first use and cached per type.

use std::any::{Any, TypeId};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use minijinja::Value;
use serde::Serialize;
use tracing::{debug, warn};

use super::error::PromptError;
use super::message::ChatMessage;

/// Variable name that always carries the template's tool list.
pub const RESERVED_TOOLS: &str = "Tools";

/// Name that marks a declared field as ignored.
pub const IGNORE_MARKER: &str = "-";

/// Variable map handed to the renderer.
pub type Variables = BTreeMap<String, Value>;

/// A type whose fields feed template variables.
///
/// ```
/// use prompty::{ChatMessage, PromptPayload, SchemaBuilder};
///
/// struct Ticket {
///     customer: String,
///     priority: u8,
///     history: Vec<ChatMessage>,
/// }
///
/// impl PromptPayload for Ticket {
///     fn describe(schema: &mut SchemaBuilder<Self>) {
///         schema
///             .field("customer", |t: &Ticket| t.customer.clone())
///             .field("priority", |t: &Ticket| t.priority)
///             .history(|t: &Ticket| t.history.as_slice());
///     }
/// }
/// ```
pub trait PromptPayload: Sized + 'static {
    fn describe(schema: &mut SchemaBuilder<Self>);
}

type FieldAccessor<T> = Box<dyn Fn(&T) -> Value + Send + Sync>;
type HistoryAccessor<T> = Box<dyn for<'a> Fn(&'a T) -> &'a [ChatMessage] + Send + Sync>;

struct PayloadField<T> {
    name: String,
    accessor: FieldAccessor<T>,
}

/// Collects field declarations for one payload type.
pub struct SchemaBuilder<T> {
    fields: Vec<PayloadField<T>>,
    history: Option<HistoryAccessor<T>>,
    reserved: bool,
}

impl<T: 'static> SchemaBuilder<T> {
    fn new() -> Self {
        Self { fields: Vec::new(), history: None, reserved: false }
    }

    /// Map a field to the template variable `name`.
    ///
    /// Empty names and the `-` marker are skipped. Declaring `Tools` makes
    /// the whole payload type invalid.
    pub fn field<F, V>(&mut self, name: &str, accessor: F) -> &mut Self
    where
        F: Fn(&T) -> V + Send + Sync + 'static,
        V: Serialize,
    {
        if name.is_empty() || name == IGNORE_MARKER {
            return self;
        }
        if name == RESERVED_TOOLS {
            self.reserved = true;
            return self;
        }
        self.fields.push(PayloadField {
            name: name.to_string(),
            accessor: Box::new(move |payload: &T| Value::from_serialize(accessor(payload))),
        });
        self
    }

    /// Designate the chat-history field. Only the first declaration counts.
    pub fn history<F>(&mut self, accessor: F) -> &mut Self
    where
        F: for<'a> Fn(&'a T) -> &'a [ChatMessage] + Send + Sync + 'static,
    {
        if self.history.is_some() {
            warn!(
                payload = std::any::type_name::<T>(),
                "ignoring additional history field; the first declaration wins"
            );
            return self;
        }
        self.history = Some(Box::new(accessor));
        self
    }
}

/// Cached extraction plan for one payload type.
pub struct PayloadSchema<T> {
    fields: Vec<PayloadField<T>>,
    history: Option<HistoryAccessor<T>>,
}

impl<T: PromptPayload> PayloadSchema<T> {
    fn build() -> Result<Self, PromptError> {
        let mut builder = SchemaBuilder::new();
        T::describe(&mut builder);
        if builder.reserved {
            return Err(PromptError::ReservedVariable);
        }
        if builder.fields.is_empty() && builder.history.is_none() {
            return Err(PromptError::InvalidPayload);
        }
        Ok(Self { fields: builder.fields, history: builder.history })
    }

    /// Variable names in declaration order.
    pub fn variable_names(&self) -> Vec<&str> {
        self.fields.iter().map(|field| field.name.as_str()).collect()
    }

    pub fn has_history(&self) -> bool {
        self.history.is_some()
    }

    /// Read the current field values of `payload`.
    pub fn extract(&self, payload: &T) -> ExtractedPayload {
        let variables =
            self.fields.iter().map(|field| (field.name.clone(), (field.accessor)(payload))).collect();
        let history = self.history.as_ref().map(|read| read(payload).to_vec()).unwrap_or_default();
        ExtractedPayload { variables, history }
    }
}

/// Variables and history read from one payload value.
#[derive(Debug, Clone, Default)]
pub struct ExtractedPayload {
    pub variables: Variables,
    pub history: Vec<ChatMessage>,
}

/// Write-once, read-many cache of payload schemas keyed by type.
///
/// Concurrent first uses may both build a schema; the first one stored wins
/// and every later lookup returns that same instance.
#[derive(Default)]
pub struct SchemaCache {
    schemas: RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide cache used when a template is not given its own.
    pub fn shared() -> Arc<SchemaCache> {
        static SHARED: OnceLock<Arc<SchemaCache>> = OnceLock::new();
        SHARED.get_or_init(|| Arc::new(SchemaCache::new())).clone()
    }

    /// Fetch the schema for `T`, building and storing it on first use.
    pub fn schema_for<T: PromptPayload>(&self) -> Result<Arc<PayloadSchema<T>>, PromptError> {
        let key = TypeId::of::<T>();
        let cached = self.schemas.read().unwrap_or_else(PoisonError::into_inner).get(&key).cloned();
        if let Some(schema) = cached {
            return downcast_schema(schema);
        }

        let built: Arc<dyn Any + Send + Sync> = Arc::new(PayloadSchema::<T>::build()?);
        debug!(payload = std::any::type_name::<T>(), "built payload schema");
        let stored = self
            .schemas
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key)
            .or_insert(built)
            .clone();
        downcast_schema(stored)
    }

    pub fn len(&self) -> usize {
        self.schemas.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn downcast_schema<T: PromptPayload>(
    schema: Arc<dyn Any + Send + Sync>,
) -> Result<Arc<PayloadSchema<T>>, PromptError> {
    schema.downcast::<PayloadSchema<T>>().map_err(|_| PromptError::InvalidPayload)
}

/// Turn an optional payload into variables and history.
///
/// An absent payload, a type with no usable fields, or a type declaring
/// `Tools` is rejected.
pub fn extract_payload<P: PromptPayload>(
    cache: &SchemaCache,
    payload: Option<&P>,
) -> Result<ExtractedPayload, PromptError> {
    let payload = payload.ok_or(PromptError::InvalidPayload)?;
    let schema = cache.schema_for::<P>()?;
    Ok(schema.extract(payload))
}
