//! Output-commit pipeline (C7, spec §4.6): drives the nested transaction
//! tree from `Running` through a committed result in the stage order the
//! spec fixes, aborting the reverse-order prefix (excluding `User`) on
//! any failure. Grounded on `orbit_connect::manager`'s registry-of-handles
//! shape, adapted from a connection cache to a transaction-id cache keyed
//! by role instead of star id.

use async_trait::async_trait;
use controller_model::{CellTag, ChunkId, OutputTable, TransactionRole, TransactionTree};
use controller_proto::master::{Master, TableStatistics};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::{CommitStage, Result, TxnError};

/// Hook for a derived controller's custom commit-time logic (spec
/// §4.6's `CustomCommit` stage). The default is a no-op.
#[async_trait]
pub trait CustomCommitHook: Send + Sync {
    async fn run(&self) -> controller_proto::Result<()> {
        Ok(())
    }
}

pub struct NoopCommitHook;

#[async_trait]
impl CustomCommitHook for NoopCommitHook {}

/// A raw chunk tree id that is not a chunk list and does not already
/// live in `destination_cell`, so it must cross cells before it can be
/// attached (spec §4.6 TeleportChunks).
#[derive(Debug, Clone)]
pub struct TeleportTarget {
    pub chunk: ChunkId,
    pub destination_cell: CellTag,
}

/// Per-table inputs the pipeline needs beyond `OutputTable` itself: the
/// statistics `EndUpload` reports, computed by the caller from whatever
/// the derived controller tracked during execution.
#[derive(Debug, Clone, Default)]
pub struct TableCommitInputs {
    pub statistics: TableStatistics,
}

fn stage_err(stage: CommitStage) -> impl Fn(controller_proto::ProtoError) -> TxnError {
    move |source| TxnError::Stage { stage, source }
}

/// Drives one operation's output-completion transaction to a committed
/// result. On failure at any stage it aborts everything the tree has
/// started so far, in reverse order, and surfaces the stage that failed.
pub struct CommitPipeline<M> {
    master: Arc<M>,
    transaction_timeout: Duration,
}

impl<M: Master + Send + Sync> CommitPipeline<M> {
    pub fn new(master: Arc<M>, transaction_timeout: Duration) -> Self {
        Self {
            master,
            transaction_timeout,
        }
    }

    /// Runs the full pipeline. `tables` and `tree` are mutated in place
    /// as upload transactions and chunk-tree ordering are resolved; on
    /// failure they're left exactly as far as execution got, and every
    /// transaction the tree recorded (other than `User`) has been
    /// aborted.
    pub async fn run(
        &self,
        tree: &mut TransactionTree,
        tables: &mut [OutputTable],
        teleport_targets: &[TeleportTarget],
        commit_inputs: &[TableCommitInputs],
        custom_commit: &dyn CustomCommitHook,
    ) -> Result<()> {
        match self
            .run_inner(tree, tables, teleport_targets, commit_inputs, custom_commit)
            .await
        {
            Ok(()) => {
                self.release_input_and_async(tree).await;
                info!("output commit pipeline completed");
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "output commit pipeline failed, aborting");
                self.abort_all(tree).await;
                Err(err)
            }
        }
    }

    async fn run_inner(
        &self,
        tree: &mut TransactionTree,
        tables: &mut [OutputTable],
        teleport_targets: &[TeleportTarget],
        commit_inputs: &[TableCommitInputs],
        custom_commit: &dyn CustomCommitHook,
    ) -> Result<()> {
        self.start_output_completion(tree).await?;
        self.begin_upload_all(tree, tables).await?;
        self.teleport_chunks(teleport_targets).await?;
        self.attach_output_chunks(tables).await?;
        self.end_upload_all(tables, commit_inputs).await?;

        custom_commit
            .run()
            .await
            .map_err(|source| TxnError::Stage {
                stage: CommitStage::CustomCommit,
                source,
            })?;

        self.commit_output_completion(tree).await?;
        self.commit_debug_completion(tree).await?;
        self.commit_transactions(tree).await?;
        Ok(())
    }

    async fn start_output_completion(&self, tree: &mut TransactionTree) -> Result<()> {
        let output = tree
            .output
            .ok_or(TxnError::MissingTransaction("output"))?;
        let id = self
            .master
            .start_transaction(Some(output), self.transaction_timeout)
            .await
            .map_err(stage_err(CommitStage::StartOutputCompletion))?;
        tree.set(TransactionRole::OutputCompletion, id);

        if let Some(debug) = tree.debug {
            let debug_completion = self
                .master
                .start_transaction(Some(debug), self.transaction_timeout)
                .await
                .map_err(stage_err(CommitStage::StartOutputCompletion))?;
            tree.set(TransactionRole::DebugCompletion, debug_completion);
        }
        Ok(())
    }

    async fn begin_upload_all(&self, tree: &TransactionTree, tables: &mut [OutputTable]) -> Result<()> {
        let output_completion = tree
            .output_completion
            .ok_or(TxnError::MissingTransaction("output_completion"))?;
        for table in tables.iter_mut() {
            let txn = self
                .master
                .begin_upload(&table.path, output_completion)
                .await
                .map_err(stage_err(CommitStage::BeginUploadAll))?;
            table.upload_transaction_id = Some(txn);
        }
        Ok(())
    }

    async fn teleport_chunks(&self, targets: &[TeleportTarget]) -> Result<()> {
        for target in targets {
            self.master
                .teleport_chunk(target.chunk, target.destination_cell.clone())
                .await
                .map_err(stage_err(CommitStage::TeleportChunks))?;
        }
        Ok(())
    }

    /// Resolves each table's commit order (sorted-output overlap/duplicate
    /// checks included) then attaches accumulated chunk trees in batches
    /// bounded by `MaxChildrenPerAttachRequest` (spec §4.6).
    async fn attach_output_chunks(&self, tables: &mut [OutputTable]) -> Result<()> {
        for table in tables.iter_mut() {
            table
                .resolve_commit_order()
                .map_err(|detail| TxnError::CommitOrder(table.path.clone(), detail))?;

            let parent = table
                .result_chunk_list_id
                .ok_or_else(|| TxnError::MissingChunkListId(table.path.clone()))?;
            let params = self
                .master
                .get_upload_params(&table.path)
                .await
                .map_err(stage_err(CommitStage::AttachOutputChunks))?;
            let batch_size = params.max_children_per_attach_request.max(1);

            for batch in table.chunk_trees.chunks(batch_size) {
                let children: Vec<u64> = batch.iter().map(|entry| entry.chunk_tree_id).collect();
                self.master
                    .attach_chunk_trees(parent, children)
                    .await
                    .map_err(stage_err(CommitStage::AttachOutputChunks))?;
            }
        }
        Ok(())
    }

    async fn end_upload_all(&self, tables: &[OutputTable], inputs: &[TableCommitInputs]) -> Result<()> {
        for (table, input) in tables.iter().zip(inputs.iter()) {
            let txn = table
                .upload_transaction_id
                .ok_or(TxnError::MissingTransaction("upload"))?;
            self.master
                .end_upload(&table.path, txn, input.statistics.clone())
                .await
                .map_err(stage_err(CommitStage::EndUploadAll))?;
        }
        Ok(())
    }

    async fn commit_output_completion(&self, tree: &TransactionTree) -> Result<()> {
        let id = tree
            .output_completion
            .ok_or(TxnError::MissingTransaction("output_completion"))?;
        self.master
            .commit_transaction(id)
            .await
            .map_err(stage_err(CommitStage::CommitOutputCompletion))
    }

    async fn commit_debug_completion(&self, tree: &TransactionTree) -> Result<()> {
        if let Some(id) = tree.debug_completion {
            self.master
                .commit_transaction(id)
                .await
                .map_err(stage_err(CommitStage::CommitDebugCompletion))?;
        }
        Ok(())
    }

    async fn commit_transactions(&self, tree: &TransactionTree) -> Result<()> {
        let output = tree.output.ok_or(TxnError::MissingTransaction("output"))?;
        self.master
            .commit_transaction(output)
            .await
            .map_err(stage_err(CommitStage::CommitTransactions))?;
        if let Some(debug) = tree.debug {
            self.master
                .commit_transaction(debug)
                .await
                .map_err(stage_err(CommitStage::CommitTransactions))?;
        }
        Ok(())
    }

    /// Final stage on the happy path: the input and async transactions
    /// held a read lock/preview and are never committed, only released
    /// (spec §4.6's closing `abort(Input, Async)`). Best-effort: a
    /// failure here doesn't unwind an already-committed result.
    async fn release_input_and_async(&self, tree: &TransactionTree) {
        if let Some(input) = tree.input {
            if let Err(err) = self.master.abort_transaction(input).await {
                warn!(error = %err, "failed to release input transaction after commit");
            }
        }
        if let Some(async_id) = tree.r#async {
            if let Err(err) = self.master.abort_transaction(async_id).await {
                warn!(error = %err, "failed to release async transaction after commit");
            }
        }
    }

    async fn abort_all(&self, tree: &TransactionTree) {
        for (role, id) in tree.abortable_in_order() {
            if let Err(err) = self.master.abort_transaction(id).await {
                warn!(role = ?role, txn = id.get(), error = %err, "failed to abort transaction during rollback");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use controller_model::ChunkTreeEntry;
    use controller_proto::testing::FakeMaster;

    fn table_with_entries(path: &str, entries: Vec<ChunkTreeEntry>) -> OutputTable {
        let mut table = OutputTable::new(path, CellTag("cell-1".to_string()));
        table.result_chunk_list_id = Some(1);
        table.chunk_trees = entries;
        table
    }

    fn entry(id: u64) -> ChunkTreeEntry {
        ChunkTreeEntry {
            min_key: None,
            max_key: None,
            chunk_tree_id: id,
            output_order_index: None,
        }
    }

    #[tokio::test]
    async fn happy_path_commits_output_and_releases_input() {
        let master = Arc::new(FakeMaster::new());
        let user = master.start_transaction(None, Duration::from_secs(60)).await.unwrap();
        let mut tree = TransactionTree::new(user);
        tree.set(
            TransactionRole::Input,
            master.start_transaction(Some(user), Duration::from_secs(60)).await.unwrap(),
        );
        tree.set(
            TransactionRole::Output,
            master.start_transaction(Some(user), Duration::from_secs(60)).await.unwrap(),
        );

        let mut tables = vec![table_with_entries("//tmp/out", vec![entry(1), entry(2)])];
        let inputs = vec![TableCommitInputs::default()];

        let pipeline = CommitPipeline::new(master.clone(), Duration::from_secs(60));
        pipeline
            .run(&mut tree, &mut tables, &[], &inputs, &NoopCommitHook)
            .await
            .unwrap();

        assert!(master.is_committed(tree.output.unwrap()));
        assert!(master.is_committed(tree.output_completion.unwrap()));
        assert!(master.is_committed(tree.input.unwrap()));
        assert_eq!(master.attached_children(1), vec![1, 2]);
    }

    #[tokio::test]
    async fn failure_aborts_already_started_transactions_in_reverse_order() {
        struct FailingCommitHook;
        #[async_trait]
        impl CustomCommitHook for FailingCommitHook {
            async fn run(&self) -> controller_proto::Result<()> {
                Err(controller_proto::ProtoError::Permanent("custom commit rejected".into()))
            }
        }

        let master = Arc::new(FakeMaster::new());
        let user = master.start_transaction(None, Duration::from_secs(60)).await.unwrap();
        let mut tree = TransactionTree::new(user);
        tree.set(
            TransactionRole::Input,
            master.start_transaction(Some(user), Duration::from_secs(60)).await.unwrap(),
        );
        tree.set(
            TransactionRole::Output,
            master.start_transaction(Some(user), Duration::from_secs(60)).await.unwrap(),
        );

        let mut tables = vec![table_with_entries("//tmp/out", vec![entry(1)])];
        let inputs = vec![TableCommitInputs::default()];

        let pipeline = CommitPipeline::new(master.clone(), Duration::from_secs(60));
        let result = pipeline
            .run(&mut tree, &mut tables, &[], &inputs, &FailingCommitHook)
            .await;

        assert!(result.is_err());
        assert!(master.is_aborted(tree.output.unwrap()));
        assert!(master.is_aborted(tree.input.unwrap()));
        assert!(master.is_aborted(tree.output_completion.unwrap()));
        assert!(!master.is_committed(tree.output.unwrap()));
        assert!(!master.is_committed(tree.input.unwrap()));
        assert!(!master.is_committed(tree.output_completion.unwrap()));
    }

    #[tokio::test]
    async fn overlapping_sorted_output_fails_before_any_attach() {
        let master = Arc::new(FakeMaster::new());
        let user = master.start_transaction(None, Duration::from_secs(60)).await.unwrap();
        let mut tree = TransactionTree::new(user);
        tree.set(
            TransactionRole::Output,
            master.start_transaction(Some(user), Duration::from_secs(60)).await.unwrap(),
        );

        let mut table = OutputTable::new("//tmp/sorted", CellTag("cell-1".to_string()));
        table.schema_is_sorted = true;
        table.result_chunk_list_id = Some(7);
        table.record_chunk_tree(ChunkTreeEntry {
            min_key: Some(vec![5]),
            max_key: Some(vec![10]),
            chunk_tree_id: 1,
            output_order_index: None,
        });
        table.record_chunk_tree(ChunkTreeEntry {
            min_key: Some(vec![0]),
            max_key: Some(vec![6]),
            chunk_tree_id: 2,
            output_order_index: None,
        });
        let mut tables = vec![table];
        let inputs = vec![TableCommitInputs::default()];

        let pipeline = CommitPipeline::new(master.clone(), Duration::from_secs(60));
        let result = pipeline
            .run(&mut tree, &mut tables, &[], &inputs, &NoopCommitHook)
            .await;

        assert!(matches!(result, Err(TxnError::CommitOrder(_, _))));
        assert!(master.attached_children(7).is_empty());
    }
}
