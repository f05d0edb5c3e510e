// src/services/collector.rs

use async_trait::async_trait;
use serde_json::json;

use crate::services::cukcuk::SourcePos;
use crate::types::{Checkpoint, SourceRecord};
use crate::utils::SyncResult;
use crate::{log_debug, log_info, log_warn};

/// Fixed page size for branch-partitioned menu-item collection.
pub const PAGE_SIZE: u32 = 100;

/// Injected checkpoint persistence. The collector saves after every page
/// fetch; where the checkpoint goes (disk, database, nowhere) is the
/// caller's decision.
#[async_trait]
pub trait CheckpointSink: Send + Sync {
    async fn save(&self, checkpoint: &Checkpoint) -> SyncResult<()>;
}

/// Retrieves complete, branch-partitioned collections from the source
/// system, optionally resuming from a prior checkpoint.
pub struct Collector<'a> {
    source: &'a dyn SourcePos,
}

impl<'a> Collector<'a> {
    pub fn new(source: &'a dyn SourcePos) -> Self {
        Self { source }
    }

    /// Collects the full menu-item catalog across all branches. With a
    /// `resume` checkpoint, branches before the checkpointed branch are
    /// skipped and that branch restarts from the checkpointed page. A
    /// branch-level failure is logged and skipped; the remaining branches
    /// still contribute.
    pub async fn collect_menu_items(
        &self,
        include_inactive: bool,
        category_id: Option<&str>,
        resume: Option<Checkpoint>,
        sink: Option<&dyn CheckpointSink>,
    ) -> SyncResult<Vec<SourceRecord>> {
        let branches = self.source.list_branches(include_inactive).await?;
        if branches.is_empty() {
            log_info!("No branches returned by the source system; nothing to collect");
            return Ok(Vec::new());
        }

        let mut collected = Vec::new();
        let mut skipping = resume.is_some();

        for branch in &branches {
            let branch_name = branch.get_str("Name").unwrap_or_default().to_string();

            let start_page = if skipping {
                match &resume {
                    Some(cp) if cp.branch_id == branch.external_id => {
                        skipping = false;
                        cp.page
                    }
                    _ => continue,
                }
            } else {
                1
            };

            match self
                .collect_branch(
                    &branch.external_id,
                    &branch_name,
                    category_id,
                    include_inactive,
                    start_page,
                    sink,
                )
                .await
            {
                Ok(mut records) => collected.append(&mut records),
                Err(err) => {
                    log_warn!(
                        "Branch collection failed; its items will be missing from this run",
                        json!({
                            "branch_id": branch.external_id,
                            "branch_name": branch_name,
                            "error": err.to_string(),
                        })
                    );
                }
            }
        }

        if skipping {
            // Checkpoint named a branch the source no longer returns.
            log_warn!(
                "Resume checkpoint branch not found; nothing was collected",
                json!({ "branch_id": resume.map(|c| c.branch_id) })
            );
        }

        Ok(collected)
    }

    async fn collect_branch(
        &self,
        branch_id: &str,
        branch_name: &str,
        category_id: Option<&str>,
        include_inactive: bool,
        start_page: u32,
        sink: Option<&dyn CheckpointSink>,
    ) -> SyncResult<Vec<SourceRecord>> {
        let mut page = start_page;
        let mut records = Vec::new();

        loop {
            let item_page = self
                .source
                .fetch_menu_items_page(branch_id, category_id, page, PAGE_SIZE, include_inactive)
                .await?;

            // Save after every fetch, empty pages included, so the caller
            // can always persist "last page attempted".
            if let Some(sink) = sink {
                let checkpoint = Checkpoint::new(branch_id, page);
                if let Err(err) = sink.save(&checkpoint).await {
                    log_warn!(
                        "Checkpoint save failed; resume granularity degraded",
                        json!({ "branch_id": branch_id, "page": page, "error": err.to_string() })
                    );
                }
            }

            let total = item_page.total;
            for mut record in item_page.records {
                // The page payload carries no branch context of its own.
                record
                    .fields
                    .insert("BranchId".to_string(), json!(branch_id));
                record
                    .fields
                    .insert("BranchName".to_string(), json!(branch_name));
                records.push(record);
            }

            log_debug!(
                "Fetched menu item page",
                json!({ "branch_id": branch_id, "page": page, "total": total })
            );

            if (page as u64) * (PAGE_SIZE as u64) >= total {
                break;
            }
            page += 1;
        }

        Ok(records)
    }
}
