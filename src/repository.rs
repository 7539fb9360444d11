//! Typed repository facade: register query methods once, invoke them by name.
//!
//! ```
//! use nexuslite_repository::exec::MemoryCollection;
//! use nexuslite_repository::query::{MethodSignature, ParamKind};
//! use nexuslite_repository::schema::EntitySchema;
//! use nexuslite_repository::{Repository, params};
//! use serde::{Deserialize, Serialize};
//! use std::sync::Arc;
//!
//! #[derive(Serialize, Deserialize)]
//! struct Person {
//!     lastname: String,
//!     age: i32,
//! }
//!
//! let people = Arc::new(MemoryCollection::new("people"));
//! people.insert_serialized(&Person { lastname: "Matthews".into(), age: 39 }).unwrap();
//! let repo: Repository<Person> =
//!     Repository::new(people, EntitySchema::new("Person").string("lastname").number("age"));
//! repo.register(MethodSignature::new("findByLastname", [ParamKind::Value])).unwrap();
//! let found = repo.find("findByLastname", &params!["Matthews"]).unwrap();
//! assert_eq!(found[0].age, 39);
//! ```

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::config::RepositoryConfig;
use crate::errors::DbError;
use crate::exec::{
    CollectionHandle, GeoPage, GeoResults, IndexSpec, Page, QueryExecution, QueryOutcome, ResultStream,
};
use crate::query::{CompiledQuery, MethodSignature, Param, QueryCache, QuerySpecification, ResultShape, Sort};
use crate::schema::{EntitySchema, SchemaProvider};

/// Repository over one collection whose documents deserialize into `T`.
pub struct Repository<T> {
    collection: Arc<dyn CollectionHandle>,
    schema: Arc<EntitySchema>,
    config: RepositoryConfig,
    cache: Option<Arc<QueryCache>>,
    methods: RwLock<HashMap<String, Vec<Arc<CompiledQuery>>>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Repository<T> {
    pub fn new(collection: Arc<dyn CollectionHandle>, schema: impl Into<Arc<EntitySchema>>) -> Self {
        Self {
            collection,
            schema: schema.into(),
            config: RepositoryConfig::default(),
            cache: None,
            methods: RwLock::new(HashMap::new()),
            _marker: PhantomData,
        }
    }

    /// Look the entity schema up through `provider`.
    ///
    /// # Errors
    /// `DbError::Config` when the provider does not know `entity`.
    pub fn from_provider(
        collection: Arc<dyn CollectionHandle>,
        provider: &dyn SchemaProvider,
        entity: &str,
    ) -> Result<Self, DbError> {
        let schema = provider
            .schema_for(entity)
            .ok_or_else(|| DbError::Config(format!("no schema registered for entity `{entity}`")))?;
        Ok(Self::new(collection, schema))
    }

    /// Replace the configuration. Call before registering methods.
    ///
    /// A non-default `compiled_cache_capacity` gives this repository its own cache of that size.
    #[must_use]
    pub fn with_config(mut self, config: RepositoryConfig) -> Self {
        if self.cache.is_none() && config.compiled_cache_capacity != QueryCache::DEFAULT_CAPACITY {
            self.cache = Some(Arc::new(QueryCache::new(config.compiled_cache_capacity)));
        }
        self.config = config;
        self
    }

    /// Use a private compiled-query cache instead of the process-wide one.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<QueryCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    #[must_use]
    pub fn schema(&self) -> &EntitySchema {
        &self.schema
    }

    #[must_use]
    pub const fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    fn compile(&self, signature: &MethodSignature) -> Result<Arc<CompiledQuery>, DbError> {
        if !self.config.cache_compiled_queries {
            return CompiledQuery::compile(signature, &self.schema).map(Arc::new);
        }
        match &self.cache {
            Some(cache) => cache.get_or_compile(signature, &self.schema),
            None => QueryCache::global().get_or_compile(signature, &self.schema),
        }
    }

    /// Compile and register `signature`. Overloads sharing a name are kept side by side.
    ///
    /// # Errors
    /// The compile error, naming the method and the reason.
    pub fn register(&self, signature: MethodSignature) -> Result<(), DbError> {
        let signature = if signature.entity().is_empty() {
            signature.for_entity(self.schema.name.clone())
        } else {
            signature
        };
        let compiled = self.compile(&signature).inspect_err(|e| {
            log::error!("rejecting query method {signature}: {e}");
        })?;
        log::info!("registered query method {signature}");
        log::debug!("compiled {}: {}", signature.name(), compiled.describe());
        let mut methods = self.methods.write();
        let overloads = methods.entry(signature.name().to_string()).or_default();
        overloads.retain(|c| c.signature() != &signature);
        overloads.push(compiled);
        Ok(())
    }

    /// # Errors
    /// Stops at the first signature that fails to compile.
    pub fn register_all(&self, signatures: impl IntoIterator<Item = MethodSignature>) -> Result<(), DbError> {
        signatures.into_iter().try_for_each(|s| self.register(s))
    }

    /// Registered signatures, sorted by method name.
    #[must_use]
    pub fn methods(&self) -> Vec<MethodSignature> {
        let mut out: Vec<MethodSignature> =
            self.methods.read().values().flatten().map(|c| c.signature().clone()).collect();
        out.sort_by(|a, b| a.name().cmp(b.name()));
        out
    }

    /// Pick the overload of `name` that accepts `args`.
    fn resolve(&self, name: &str, args: &[Param]) -> Result<Arc<CompiledQuery>, DbError> {
        let methods = self.methods.read();
        let overloads = methods.get(name).ok_or_else(|| DbError::UnknownMethod(name.to_string()))?;
        if let Some(hit) = overloads.iter().find(|c| c.accepts(args)) {
            return Ok(hit.clone());
        }
        match overloads.as_slice() {
            // A single candidate reports the precise binding error.
            [only] => Ok(only.clone()),
            _ => {
                let kinds: Vec<&str> = args.iter().map(Param::kind_name).collect();
                Err(DbError::mismatch(name, format!("no overload accepts ({})", kinds.join(", "))))
            }
        }
    }

    /// Bind `args` to the registered method without executing it.
    ///
    /// # Errors
    /// `UnknownMethod`, or the binding errors of [`CompiledQuery::bind`].
    pub fn specification(&self, name: &str, args: &[Param]) -> Result<QuerySpecification, DbError> {
        let compiled = self.resolve(name, args)?;
        let compiled = if self.config.cache_compiled_queries {
            compiled
        } else {
            self.compile(compiled.signature())?
        };
        compiled.bind(args, self.config.max_in_set)
    }

    /// Ask the store for a 2d index on every geospatial property.
    ///
    /// # Errors
    /// `QueryExecution` when the store rejects an index.
    pub fn ensure_indexes(&self) -> Result<Vec<IndexSpec>, DbError> {
        let specs: Vec<IndexSpec> = self.schema.geo_paths().into_iter().map(IndexSpec::geo2d).collect();
        for spec in &specs {
            self.collection.ensure_index(spec).map_err(|source| DbError::QueryExecution {
                collection: self.collection.name().to_string(),
                source,
            })?;
        }
        Ok(specs)
    }

    fn execution(&self) -> QueryExecution<'_> {
        QueryExecution::new(self.collection.as_ref(), &self.config)
    }
}

fn shape_error(name: &str, wanted: &str, got: &str) -> DbError {
    DbError::mismatch(name, format!("method returns {got}, not {wanted}"))
}

impl<T: DeserializeOwned> Repository<T> {
    /// Execute a registered method; the outcome follows its result shape.
    ///
    /// # Errors
    /// Binding errors, `UnknownMethod`, or `QueryExecution` from the store.
    pub fn invoke(&self, name: &str, args: &[Param]) -> Result<QueryOutcome<T>, DbError> {
        let spec = self.specification(name, args)?;
        self.execution().run(&spec)
    }

    /// Lazy results of a list method.
    ///
    /// # Errors
    /// As [`Repository::invoke`].
    pub fn stream(&self, name: &str, args: &[Param]) -> Result<ResultStream<T>, DbError> {
        let spec = self.specification(name, args)?;
        if spec.shape() != ResultShape::List {
            return Err(shape_error(name, "a stream", &format!("{:?}", spec.shape())));
        }
        self.execution().stream(&spec)
    }

    /// # Errors
    /// As [`Repository::invoke`], plus `ClauseTypeMismatch` for a non-list method.
    pub fn find(&self, name: &str, args: &[Param]) -> Result<Vec<T>, DbError> {
        match self.invoke(name, args)? {
            QueryOutcome::List(v) => Ok(v),
            QueryOutcome::One(o) => Ok(o.into_iter().collect()),
            other => Err(shape_error(name, "a list", other.shape_name())),
        }
    }

    /// # Errors
    /// As [`Repository::find`].
    pub fn find_one(&self, name: &str, args: &[Param]) -> Result<Option<T>, DbError> {
        match self.invoke(name, args)? {
            QueryOutcome::One(o) => Ok(o),
            QueryOutcome::List(v) => Ok(v.into_iter().next()),
            other => Err(shape_error(name, "one entity", other.shape_name())),
        }
    }

    /// # Errors
    /// As [`Repository::invoke`], plus `ClauseTypeMismatch` for a non-count method.
    pub fn count(&self, name: &str, args: &[Param]) -> Result<u64, DbError> {
        match self.invoke(name, args)? {
            QueryOutcome::Count(n) => Ok(n),
            other => Err(shape_error(name, "a count", other.shape_name())),
        }
    }

    /// # Errors
    /// As [`Repository::invoke`], plus `ClauseTypeMismatch` for a non-exists method.
    pub fn exists(&self, name: &str, args: &[Param]) -> Result<bool, DbError> {
        match self.invoke(name, args)? {
            QueryOutcome::Exists(b) => Ok(b),
            other => Err(shape_error(name, "a boolean", other.shape_name())),
        }
    }

    /// # Errors
    /// As [`Repository::invoke`], plus `ClauseTypeMismatch` for a non-page method.
    pub fn find_page(&self, name: &str, args: &[Param]) -> Result<Page<T>, DbError> {
        match self.invoke(name, args)? {
            QueryOutcome::Page(p) => Ok(p),
            other => Err(shape_error(name, "a page", other.shape_name())),
        }
    }

    /// # Errors
    /// As [`Repository::invoke`], plus `ClauseTypeMismatch` for other shapes.
    pub fn find_geo(&self, name: &str, args: &[Param]) -> Result<GeoResults<T>, DbError> {
        match self.invoke(name, args)? {
            QueryOutcome::GeoResults(r) => Ok(r),
            other => Err(shape_error(name, "geo results", other.shape_name())),
        }
    }

    /// # Errors
    /// As [`Repository::invoke`], plus `ClauseTypeMismatch` for other shapes.
    pub fn find_geo_page(&self, name: &str, args: &[Param]) -> Result<GeoPage<T>, DbError> {
        match self.invoke(name, args)? {
            QueryOutcome::GeoPage(p) => Ok(p),
            other => Err(shape_error(name, "a geo page", other.shape_name())),
        }
    }

    /// Every entity, optionally sorted.
    ///
    /// # Errors
    /// `UnresolvedProperty` for a sort key outside the schema, `QueryExecution` from the store.
    pub fn find_all(&self, sort: Option<Sort>) -> Result<Vec<T>, DbError> {
        let sort = sort.map(|s| crate::query::resolve_sort(s, &self.schema, "findAll")).transpose()?;
        let spec = QuerySpecification::unfiltered("findAll", ResultShape::List, sort);
        match self.execution().run(&spec)? {
            QueryOutcome::List(v) => Ok(v),
            other => Err(shape_error("findAll", "a list", other.shape_name())),
        }
    }

    /// # Errors
    /// `QueryExecution` from the store.
    pub fn count_all(&self) -> Result<u64, DbError> {
        let spec = QuerySpecification::unfiltered("countAll", ResultShape::Count, None);
        match self.execution().run::<T>(&spec)? {
            QueryOutcome::Count(n) => Ok(n),
            other => Err(shape_error("countAll", "a count", other.shape_name())),
        }
    }
}
