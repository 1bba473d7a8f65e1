use futures::TryStreamExt;
use mongodb::error::ErrorKind;
use mongodb::options::ClientOptions;
use mongodb::{bson, Client};
use mongodb_exporter_component::Error;
use tracing::info;

pub const APP_NAME: &str = "mongodb_exporter";

/// Server error codes with a meaning for the exporter.
pub mod codes {
    pub const UNAUTHORIZED: i32 = 13;
    pub const AUTHENTICATION_FAILED: i32 = 18;
    pub const NAMESPACE_NOT_FOUND: i32 = 26;
    pub const NO_REPLICATION_ENABLED: i32 = 76;
    pub const NOT_YET_INITIALIZED: i32 = 94;
}

/// Fetches raw documents from the server.
#[async_trait::async_trait]
pub trait DocumentSource: std::fmt::Debug + Send + Sync {
    async fn run_command(
        &self,
        database: &str,
        command: bson::Document,
    ) -> Result<bson::Document, Error>;

    async fn list_databases(&self) -> Result<Vec<String>, Error>;

    async fn list_collections(&self, database: &str) -> Result<Vec<String>, Error>;

    /// Returns the `$indexStats` records of a collection.
    async fn index_stats(
        &self,
        database: &str,
        collection: &str,
    ) -> Result<Vec<bson::Document>, Error>;
}

/// Classifies a server reply code.
///
/// Returns `None` for codes without a special meaning.
pub fn classify_code(code: i32, message: &str) -> Option<Error> {
    match code {
        codes::NO_REPLICATION_ENABLED | codes::NOT_YET_INITIALIZED => {
            Some(Error::FeatureDisabled {
                feature: "replication",
                reason: message.to_string(),
            })
        }
        codes::NAMESPACE_NOT_FOUND => Some(Error::FeatureDisabled {
            feature: "namespace",
            reason: message.to_string(),
        }),
        _ => None,
    }
}

pub fn classify(err: mongodb::error::Error) -> Error {
    let (code, message) = match &*err.kind {
        ErrorKind::Command(command) => (Some(command.code), command.message.clone()),
        ErrorKind::Authentication { message, .. } => {
            (Some(codes::AUTHENTICATION_FAILED), message.clone())
        }
        _ => (None, String::new()),
    };
    match code {
        Some(codes::UNAUTHORIZED | codes::AUTHENTICATION_FAILED) => Error::permission_denied(err),
        Some(code) => classify_code(code, &message).unwrap_or_else(|| Error::connectivity(err)),
        None => Error::connectivity(err),
    }
}

#[derive(Debug, Clone)]
pub struct MongoSource {
    client: Client,
}

impl MongoSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connects and pings the server.
    pub async fn connect(uri: &str, direct_connection: bool) -> Result<Self, Error> {
        let mut options = ClientOptions::parse(uri).await.map_err(classify)?;
        options.app_name = Some(APP_NAME.to_string());
        if direct_connection {
            options.direct_connection = Some(true);
        }
        let hosts = options
            .hosts
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let client = Client::with_options(options).map_err(classify)?;

        // send ping to confirm a successful connection
        client
            .database("admin")
            .run_command(bson::doc! { "ping": 1 })
            .await
            .map_err(classify)?;

        info!(hosts, "connected to database");
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl DocumentSource for MongoSource {
    async fn run_command(
        &self,
        database: &str,
        command: bson::Document,
    ) -> Result<bson::Document, Error> {
        self.client
            .database(database)
            .run_command(command)
            .await
            .map_err(classify)
    }

    async fn list_databases(&self) -> Result<Vec<String>, Error> {
        self.client.list_database_names().await.map_err(classify)
    }

    async fn list_collections(&self, database: &str) -> Result<Vec<String>, Error> {
        self.client
            .database(database)
            .list_collection_names()
            .await
            .map_err(classify)
    }

    /// See <https://www.mongodb.com/docs/manual/reference/operator/aggregation/indexStats/>.
    async fn index_stats(
        &self,
        database: &str,
        collection: &str,
    ) -> Result<Vec<bson::Document>, Error> {
        let collection = self
            .client
            .database(database)
            .collection::<bson::Document>(collection);
        let cursor = collection
            .aggregate([bson::doc! {"$indexStats": {}}])
            .await
            .map_err(classify)?;
        cursor.try_collect().await.map_err(classify)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use mongodb_exporter_component::ErrorClass;

    #[test]
    fn replication_codes_are_feature_disabled() {
        for code in [codes::NO_REPLICATION_ENABLED, codes::NOT_YET_INITIALIZED] {
            let err = classify_code(code, "not running with --replSet").unwrap();
            assert_eq!(err.class(), ErrorClass::FeatureDisabled);
        }
        assert!(classify_code(1, "internal error").is_none());
    }

    #[test]
    fn command_keys() {
        assert_eq!(
            fake::command_key("admin", &bson::doc! { "serverStatus": 1, "recordStats": 0 }),
            "admin:serverStatus"
        );
        assert_eq!(
            fake::command_key("test", &bson::doc! { "collStats": "users", "scale": 1 }),
            "test:collStats:users"
        );
    }
}
