//! Schema and model introspection.
//!
//! The compiler resolves resource types, search parameters, compartments and
//! interned systems to their numeric ids through [`SqlServerModel`]. Hosts
//! usually back it with dictionaries loaded from the database at startup;
//! [`InMemorySqlServerModel`] is such a dictionary-backed implementation.

use std::collections::{BTreeMap, HashMap};

use parking_lot::RwLock;

use crate::error::{SqlSearchError, SqlSearchResult};

/// Lookups the compiler needs from the database model.
///
/// Implementations are shared across concurrent compile calls and must be
/// internally synchronized.
pub trait SqlServerModel: Send + Sync {
    /// Returns the numeric id of a search parameter.
    fn get_search_param_id(&self, url: &str) -> SqlSearchResult<i16>;

    /// Returns the numeric id of a resource type, if it is known.
    fn try_get_resource_type_id(&self, name: &str) -> Option<i16>;

    /// Returns the numeric id of a resource type.
    fn get_resource_type_id(&self, name: &str) -> SqlSearchResult<i16> {
        self.try_get_resource_type_id(name)
            .ok_or_else(|| SqlSearchError::UnknownResourceType {
                name: name.to_string(),
            })
    }

    /// All known resource type ids in ascending order.
    fn resource_type_ids(&self) -> Vec<i16>;

    /// Returns the numeric id of a compartment type.
    fn get_compartment_type_id(&self, name: &str) -> SqlSearchResult<u8>;

    /// Returns the interned id of a token or quantity system, if interned.
    fn try_get_system_id(&self, system: &str) -> Option<i32>;

    /// Returns the interned id of a quantity code, if interned.
    fn try_get_quantity_code_id(&self, code: &str) -> Option<i32>;

    /// Reference search parameters that define membership in a compartment.
    ///
    /// An empty list means any reference to the compartment owner counts.
    fn compartment_search_param_ids(&self, _compartment_type: &str) -> Vec<i16> {
        Vec::new()
    }
}

#[derive(Debug, Default)]
struct ModelTables {
    resource_types: BTreeMap<String, i16>,
    search_params: HashMap<String, i16>,
    compartment_types: HashMap<String, u8>,
    systems: HashMap<String, i32>,
    quantity_codes: HashMap<String, i32>,
    compartment_params: HashMap<String, Vec<i16>>,
}

/// A dictionary-backed [`SqlServerModel`].
///
/// Dictionaries can grow while the model is shared, e.g. when the host interns
/// a new system URI.
#[derive(Debug, Default)]
pub struct InMemorySqlServerModel {
    tables: RwLock<ModelTables>,
}

impl InMemorySqlServerModel {
    /// Creates an empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a resource type id.
    pub fn with_resource_type(self, name: impl Into<String>, id: i16) -> Self {
        self.register_resource_type(name, id);
        self
    }

    /// Registers a search parameter id.
    pub fn with_search_param(self, url: impl Into<String>, id: i16) -> Self {
        self.register_search_param(url, id);
        self
    }

    /// Registers a compartment type id.
    pub fn with_compartment_type(self, name: impl Into<String>, id: u8) -> Self {
        self.tables.write().compartment_types.insert(name.into(), id);
        self
    }

    /// Registers an interned system.
    pub fn with_system(self, system: impl Into<String>, id: i32) -> Self {
        self.register_system(system, id);
        self
    }

    /// Registers an interned quantity code.
    pub fn with_quantity_code(self, code: impl Into<String>, id: i32) -> Self {
        self.tables.write().quantity_codes.insert(code.into(), id);
        self
    }

    /// Registers the reference parameters that define a compartment.
    pub fn with_compartment_params(self, compartment_type: impl Into<String>, ids: Vec<i16>) -> Self {
        self.tables
            .write()
            .compartment_params
            .insert(compartment_type.into(), ids);
        self
    }

    /// Registers a resource type id on a shared model.
    pub fn register_resource_type(&self, name: impl Into<String>, id: i16) {
        self.tables.write().resource_types.insert(name.into(), id);
    }

    /// Registers a search parameter id on a shared model.
    pub fn register_search_param(&self, url: impl Into<String>, id: i16) {
        self.tables.write().search_params.insert(url.into(), id);
    }

    /// Interns a system on a shared model.
    pub fn register_system(&self, system: impl Into<String>, id: i32) {
        self.tables.write().systems.insert(system.into(), id);
    }
}

impl SqlServerModel for InMemorySqlServerModel {
    fn get_search_param_id(&self, url: &str) -> SqlSearchResult<i16> {
        self.tables
            .read()
            .search_params
            .get(url)
            .copied()
            .ok_or_else(|| SqlSearchError::UnknownSearchParameter {
                url: url.to_string(),
            })
    }

    fn try_get_resource_type_id(&self, name: &str) -> Option<i16> {
        self.tables.read().resource_types.get(name).copied()
    }

    fn resource_type_ids(&self) -> Vec<i16> {
        let mut ids: Vec<i16> = self.tables.read().resource_types.values().copied().collect();
        ids.sort_unstable();
        ids
    }

    fn get_compartment_type_id(&self, name: &str) -> SqlSearchResult<u8> {
        self.tables
            .read()
            .compartment_types
            .get(name)
            .copied()
            .ok_or_else(|| SqlSearchError::UnknownCompartmentType {
                name: name.to_string(),
            })
    }

    fn try_get_system_id(&self, system: &str) -> Option<i32> {
        self.tables.read().systems.get(system).copied()
    }

    fn try_get_quantity_code_id(&self, code: &str) -> Option<i32> {
        self.tables.read().quantity_codes.get(code).copied()
    }

    fn compartment_search_param_ids(&self, compartment_type: &str) -> Vec<i16> {
        self.tables
            .read()
            .compartment_params
            .get(compartment_type)
            .cloned()
            .unwrap_or_default()
    }
}
