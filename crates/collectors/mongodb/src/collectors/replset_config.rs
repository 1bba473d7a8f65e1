use super::Context;
use crate::declarations::REPLSET_CONFIG;
use crate::flatten::flatten;
use crate::value::Document;
use mongodb::bson;
use mongodb_exporter_component::{Descriptor, Error, Sink};

#[derive(Debug)]
pub struct ReplSetConfig {
    ctx: Context,
}

impl ReplSetConfig {
    pub const NAME: &'static str = "replset_config";

    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }
}

#[async_trait::async_trait]
impl mongodb_exporter_component::Collector for ReplSetConfig {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn describe(&self) -> Vec<Descriptor> {
        vec![]
    }

    async fn collect(&self, sink: &mut dyn Sink) -> Result<(), Error> {
        let response = self
            .ctx
            .source
            .run_command("admin", bson::doc! { "replSetGetConfig": 1 })
            .await?;
        super::dump(Self::NAME, &response);

        let config = super::take_map(Document::from(response), "config")?;
        let flattened = flatten(&config, &REPLSET_CONFIG, self.ctx.compatible);
        self.ctx.emit(Self::NAME, flattened, sink);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::testing::{context, series};
    use crate::source::fake::FakeSource;
    use mongodb_exporter_component::{Collector, ErrorClass};

    #[tokio::test]
    async fn members_are_labeled_by_host() -> Result<(), Error> {
        let source = FakeSource::new().reply(
            "admin:replSetGetConfig",
            bson::doc! {
                "config": {
                    "_id": "rs0",
                    "version": 2,
                    "term": 3_i64,
                    "members": [
                        { "_id": 0, "host": "mongo-0:27017", "priority": 1.0, "votes": 1 },
                        { "_id": 1, "host": "mongo-1:27017", "priority": 0.5, "votes": 1, "hidden": false },
                    ],
                    "settings": { "heartbeatTimeoutSecs": 10, "replicaSetId": bson::oid::ObjectId::new() },
                },
                "ok": 1,
            },
        );
        let (ctx, _) = context(source, false);
        let mut samples = Vec::new();
        ReplSetConfig::new(ctx).collect(&mut samples).await?;
        assert_eq!(
            series(&samples),
            vec![
                "cfg.version",
                "cfg.term",
                r#"cfg.members.priority{member_idx="mongo-0:27017"}"#,
                r#"cfg.members.votes{member_idx="mongo-0:27017"}"#,
                r#"cfg.members.priority{member_idx="mongo-1:27017"}"#,
                r#"cfg.members.votes{member_idx="mongo-1:27017"}"#,
                r#"cfg.members.hidden{member_idx="mongo-1:27017"}"#,
                "cfg.settings.heartbeatTimeoutSecs",
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn config_must_be_a_document() {
        let source = FakeSource::new().reply(
            "admin:replSetGetConfig",
            bson::doc! { "config": "rs0", "ok": 1 },
        );
        let (ctx, _) = context(source, false);
        let mut samples = Vec::new();
        let err = ReplSetConfig::new(ctx)
            .collect(&mut samples)
            .await
            .unwrap_err();
        assert_eq!(err.class(), ErrorClass::Schema);
        assert!(matches!(
            err,
            Error::Schema { ref path, ref found, .. } if path == "config" && found == "string"
        ));
    }
}
