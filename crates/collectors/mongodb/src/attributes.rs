#[derive(
    Debug,
    Copy,
    Clone,
    Hash,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    strum::IntoStaticStr,
    strum::EnumIter,
)]
pub enum ConnectionState {
    #[strum(serialize = "current")]
    Current,
    #[strum(serialize = "available")]
    Available,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

/// Databases that hold server internals rather than user data.
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq, strum::IntoStaticStr, strum::EnumIter)]
pub enum SystemDatabase {
    #[strum(serialize = "admin")]
    Admin,
    #[strum(serialize = "config")]
    Config,
    #[strum(serialize = "local")]
    Local,
}

impl SystemDatabase {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    pub fn contains(database: &str) -> bool {
        use strum::IntoEnumIterator;
        Self::iter().any(|system| system.as_str() == database)
    }
}

pub fn is_system_collection(collection: &str) -> bool {
    collection.starts_with("system.")
}
