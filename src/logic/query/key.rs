use std::fmt;

/// Resource collection a query reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Models,
    Explanations,
}

impl Resource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Models => "models",
            Self::Explanations => "explanations",
        }
    }
}

/// Identity of a read: resource kind plus optional filter
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    resource: Resource,
    filter: Option<String>,
}

impl QueryKey {
    pub fn new(resource: Resource, filter: Option<String>) -> Self {
        Self { resource, filter }
    }

    pub fn models() -> Self {
        Self::new(Resource::Models, None)
    }

    /// `None` is the unfiltered list of every explanation
    pub fn explanations(model_id: Option<&str>) -> Self {
        Self::new(Resource::Explanations, model_id.map(str::to_string))
    }

    pub fn resource(&self) -> Resource {
        self.resource
    }

    pub fn filter(&self) -> Option<&str> {
        self.filter.as_deref()
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.filter {
            Some(filter) => write!(f, "{}[{}]", self.resource.as_str(), filter),
            None => f.write_str(self.resource.as_str()),
        }
    }
}

/// Which cache entries a mutation (or a caller) marks stale
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invalidation {
    /// Exactly this key
    Key(QueryKey),
    /// Every key of the resource, whatever its filter
    Resource(Resource),
}

impl Invalidation {
    pub fn matches(&self, key: &QueryKey) -> bool {
        match self {
            Self::Key(k) => k == key,
            Self::Resource(r) => key.resource() == *r,
        }
    }
}

impl From<QueryKey> for Invalidation {
    fn from(key: QueryKey) -> Self {
        Self::Key(key)
    }
}

impl From<Resource> for Invalidation {
    fn from(resource: Resource) -> Self {
        Self::Resource(resource)
    }
}
