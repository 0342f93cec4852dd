//! Sink chunk pool (spec §4.1): the terminal pool that receives stripes
//! from the last task in a DAG branch and records them into the
//! destination [`OutputTable`] instead of ever handing out jobs.

use controller_model::{ChunkStripe, ChunkTreeEntry, InputCookie, JobSummary, NodeId, OutputCookie, OutputTable, Result};
use controller_progress::ProgressCounter;

use crate::pool::{ChunkPool, ExtractionResult};

pub struct SinkChunkPool {
    table: OutputTable,
    job_counter: ProgressCounter,
    data_weight_counter: ProgressCounter,
    next_input: u64,
}

impl SinkChunkPool {
    pub fn new(table: OutputTable) -> Self {
        Self {
            table,
            job_counter: ProgressCounter::new(),
            data_weight_counter: ProgressCounter::new(),
            next_input: 0,
        }
    }

    pub fn table(&self) -> &OutputTable {
        &self.table
    }

    pub fn into_table(self) -> OutputTable {
        self.table
    }

    /// Record one incoming chunk tree directly, bypassing the ordinary
    /// add/extract cycle since a sink never schedules a job of its own.
    pub fn record_chunk_tree(&mut self, entry: ChunkTreeEntry, weight: u64) {
        self.table.record_chunk_tree(entry);
        self.job_counter.inc_completed(1);
        self.data_weight_counter.inc_completed(weight as i64);
    }
}

impl ChunkPool for SinkChunkPool {
    fn add(&mut self, stripe: ChunkStripe) -> InputCookie {
        let weight = stripe.data_weight();
        let cookie = InputCookie(self.next_input);
        self.next_input += 1;
        self.job_counter.inc_completed(1);
        self.data_weight_counter.inc_completed(weight as i64);
        cookie
    }

    fn suspend(&mut self, _cookie: InputCookie) -> Result<()> {
        Ok(())
    }

    fn resume(&mut self, _cookie: InputCookie) -> Result<()> {
        Ok(())
    }

    fn reset(&mut self, _cookie: InputCookie, _new_stripe: ChunkStripe) -> Result<()> {
        Ok(())
    }

    fn finish(&mut self) {}

    fn is_finished(&self) -> bool {
        true
    }

    fn extract(&mut self, _node: &NodeId) -> Option<(OutputCookie, ExtractionResult)> {
        None
    }

    fn completed(&mut self, _cookie: OutputCookie, _summary: &JobSummary) -> Result<()> {
        Ok(())
    }

    fn failed(&mut self, _cookie: OutputCookie) -> Result<()> {
        Ok(())
    }

    fn aborted(&mut self, _cookie: OutputCookie) -> Result<()> {
        Ok(())
    }

    fn lost(&mut self, _cookie: OutputCookie) -> Result<()> {
        Ok(())
    }

    fn job_counter(&self) -> &ProgressCounter {
        &self.job_counter
    }

    fn data_weight_counter(&self) -> &ProgressCounter {
        &self.data_weight_counter
    }

    fn locality(&self, _node: &NodeId) -> i64 {
        0
    }
}
