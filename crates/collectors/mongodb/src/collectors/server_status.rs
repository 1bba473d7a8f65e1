use super::Context;
use crate::declarations::{SERVER_STATUS, SERVER_STATUS_RECORDS};
use crate::flatten::flatten;
use crate::value::{Document, Value};
use mongodb::bson;
use mongodb_exporter_component::suppress::SuppressionKey;
use mongodb_exporter_component::{Descriptor, Error, Sink};

#[derive(Debug)]
pub struct ServerStatus {
    ctx: Context,
}

impl ServerStatus {
    pub const NAME: &'static str = "serverstatus";

    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }
}

#[async_trait::async_trait]
impl mongodb_exporter_component::Collector for ServerStatus {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn describe(&self) -> Vec<Descriptor> {
        SERVER_STATUS_RECORDS
            .iter()
            .map(|record| record.descriptor())
            .collect()
    }

    async fn collect(&self, sink: &mut dyn Sink) -> Result<(), Error> {
        let command = bson::doc! {
            "serverStatus": 1,
            "recordStats": 0,
            "opLatencies": { "histograms": true },
        };
        let response = self.ctx.source.run_command("admin", command).await?;
        super::dump(Self::NAME, &response);

        let document = Value::Map(Document::from(response));
        let mut errors = Vec::new();
        for record in SERVER_STATUS_RECORDS.iter() {
            record.record(&document, sink, &mut errors);
        }
        for err in errors {
            let key = SuppressionKey::field(Self::NAME, err.path());
            self.ctx.field_ledger.report(&key, &err.into());
        }

        if let Value::Map(document) = &document {
            let flattened = flatten(document, &SERVER_STATUS, self.ctx.compatible);
            self.ctx.emit(Self::NAME, flattened, sink);
        }
        Ok(())
    }
}
