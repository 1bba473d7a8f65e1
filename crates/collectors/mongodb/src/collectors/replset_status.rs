use super::Context;
use crate::declarations::REPLSET_STATUS;
use crate::flatten::flatten;
use crate::value::Document;
use mongodb::bson;
use mongodb_exporter_component::{Descriptor, Error, MetricKind, Sink};

#[derive(Debug)]
pub struct ReplSetStatus {
    ctx: Context,
}

impl ReplSetStatus {
    pub const NAME: &'static str = "replset_status";

    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }
}

#[async_trait::async_trait]
impl mongodb_exporter_component::Collector for ReplSetStatus {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn describe(&self) -> Vec<Descriptor> {
        vec![
            Descriptor::new(
                "rs.members.health",
                "source = replSetGetStatus members.health",
                ["member_idx"],
                MetricKind::Gauge,
            ),
            Descriptor::new(
                "rs.members.state",
                "source = replSetGetStatus members.state",
                ["member_idx"],
                MetricKind::Gauge,
            ),
        ]
    }

    /// Servers without replication answer with an error that is reported as a disabled feature.
    async fn collect(&self, sink: &mut dyn Sink) -> Result<(), Error> {
        let response = self
            .ctx
            .source
            .run_command("admin", bson::doc! { "replSetGetStatus": 1 })
            .await?;
        super::dump(Self::NAME, &response);

        let document = Document::from(response);
        let flattened = flatten(&document, &REPLSET_STATUS, self.ctx.compatible);
        self.ctx.emit(Self::NAME, flattened, sink);
        Ok(())
    }
}
