use super::Context;
use crate::declarations::DIAGNOSTIC_DATA;
use crate::flatten::flatten;
use crate::value::Document;
use mongodb::bson;
use mongodb_exporter_component::{Descriptor, Error, Sink};

/// Flattens the `data` section of `getDiagnosticData`.
///
/// The `serverStatus` and `replSetGetStatus` subtrees are left to their own collectors.
#[derive(Debug)]
pub struct DiagnosticData {
    ctx: Context,
}

impl DiagnosticData {
    pub const NAME: &'static str = "diagnostic_data";

    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }
}

#[async_trait::async_trait]
impl mongodb_exporter_component::Collector for DiagnosticData {
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
            .run_command("admin", bson::doc! { "getDiagnosticData": 1 })
            .await?;
        super::dump(Self::NAME, &response);

        let data = super::take_map(Document::from(response), "data")?;
        let flattened = flatten(&data, &DIAGNOSTIC_DATA, self.ctx.compatible);
        self.ctx.emit(Self::NAME, flattened, sink);
        Ok(())
    }
}
