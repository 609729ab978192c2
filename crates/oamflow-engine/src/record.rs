//! Post-run record export
//!
//! When the `enable_persist_workflow_record` gate is on, the executor
//! hands each finished run to the configured exporter. What gets stored
//! and where is the exporter's concern; the backup options in
//! [`crate::config::BackupConfig`] parameterize the shipped
//! implementations.

use crate::error::Result;
use async_trait::async_trait;
use oamflow_api::WorkflowRun;

/// Observer receiving finished runs
#[async_trait]
pub trait RecordExporter: Send + Sync {
    /// Export one finished run
    async fn export(&self, run: &WorkflowRun) -> Result<()>;
}

/// Exporter that keeps finished runs in memory (tests, dry runs)
#[derive(Debug, Default)]
pub struct CollectingRecordExporter {
    records: std::sync::RwLock<Vec<WorkflowRun>>,
}

impl CollectingRecordExporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of the runs exported so far
    pub fn exported(&self) -> Vec<String> {
        self.records
            .read()
            .unwrap()
            .iter()
            .map(|r| r.metadata.name.clone())
            .collect()
    }
}

#[async_trait]
impl RecordExporter for CollectingRecordExporter {
    async fn export(&self, run: &WorkflowRun) -> Result<()> {
        self.records.write().unwrap().push(run.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oamflow_api::WorkflowStep;

    #[tokio::test]
    async fn test_collecting_exporter() {
        let exporter = CollectingRecordExporter::new();
        let run = WorkflowRun::new("done-run", vec![WorkflowStep::new("a", "notify")]);

        exporter.export(&run).await.unwrap();
        assert_eq!(exporter.exported(), vec!["done-run"]);
    }
}
