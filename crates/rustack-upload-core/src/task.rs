//! Upload task bookkeeping.
//!
//! [`UploadTask`] is the serializable record of one transfer: the plan, the
//! provider upload ID, every recorded [`PartResult`], and the lifecycle
//! state. A snapshot of it is the checkpoint a transfer resumes from.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use rustack_upload_xml::{CompleteMultipartUpload, CompletedPart};

use crate::planner::{PartDescriptor, PartPlan, UploadMode};
use crate::state::{InvalidTransition, TransferEvent, TransferState};

/// The provider's acknowledgement of one part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartResult {
    /// 1-based part number.
    pub part_number: u32,
    /// ETag returned for the part.
    pub etag: String,
    /// Bytes uploaded in the part.
    pub byte_length: u64,
}

/// A finalized object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectRef {
    /// Bucket holding the object.
    pub bucket: String,
    /// Object key.
    pub key: String,
    /// Final ETag, when the provider returned one.
    pub etag: Option<String>,
    /// Public location, when the provider returned one.
    pub location: Option<String>,
}

/// State of one upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadTask {
    upload_id: Option<String>,
    bucket: String,
    key: String,
    mode: UploadMode,
    total_size: u64,
    parts: Vec<PartDescriptor>,
    completed: BTreeMap<u32, PartResult>,
    state: TransferState,
}

impl UploadTask {
    /// Create an idle task for `plan`.
    pub fn new(
        bucket: impl Into<String>,
        key: impl Into<String>,
        total_size: u64,
        plan: PartPlan,
    ) -> Self {
        Self {
            upload_id: None,
            bucket: bucket.into(),
            key: key.into(),
            mode: plan.mode,
            total_size,
            parts: plan.parts,
            completed: BTreeMap::new(),
            state: TransferState::Idle,
        }
    }

    /// Provider upload ID; `None` before initiation and for single-shot uploads.
    #[must_use]
    pub fn upload_id(&self) -> Option<&str> {
        self.upload_id.as_deref()
    }

    pub(crate) fn set_upload_id(&mut self, upload_id: String) {
        self.upload_id = Some(upload_id);
    }

    /// Destination bucket.
    #[must_use]
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Destination key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Transfer mode.
    #[must_use]
    pub fn mode(&self) -> UploadMode {
        self.mode
    }

    /// Payload size in bytes.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Planned parts.
    #[must_use]
    pub fn parts(&self) -> &[PartDescriptor] {
        &self.parts
    }

    /// Recorded part results keyed by part number.
    #[must_use]
    pub fn completed(&self) -> &BTreeMap<u32, PartResult> {
        &self.completed
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> &TransferState {
        &self.state
    }

    /// Record a part result.
    ///
    /// Returns `true` if the result was new. A second result for an already
    /// recorded part is ignored, as is a result for a part that is not in the
    /// plan.
    pub fn record(&mut self, result: PartResult) -> bool {
        if !self.parts.iter().any(|p| p.part_number == result.part_number) {
            warn!(
                part_number = result.part_number,
                key = %self.key,
                "Ignoring result for unplanned part"
            );
            return false;
        }
        if self.completed.contains_key(&result.part_number) {
            debug!(part_number = result.part_number, "Part already recorded");
            return false;
        }
        self.completed.insert(result.part_number, result);
        true
    }

    /// Parts without a recorded result, in part-number order.
    #[must_use]
    pub fn pending_parts(&self) -> Vec<PartDescriptor> {
        self.parts
            .iter()
            .filter(|p| !self.completed.contains_key(&p.part_number))
            .copied()
            .collect()
    }

    /// Whether every planned part has a result.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.completed.len() == self.parts.len()
    }

    /// Bytes covered by recorded parts.
    #[must_use]
    pub fn bytes_done(&self) -> u64 {
        self.completed.values().map(|r| r.byte_length).sum()
    }

    /// The finalize manifest, sorted by part number.
    #[must_use]
    pub fn manifest(&self) -> CompleteMultipartUpload {
        let mut parts: Vec<CompletedPart> = self
            .completed
            .values()
            .map(|r| CompletedPart {
                part_number: r.part_number,
                etag: r.etag.clone(),
            })
            .collect();
        parts.sort_by_key(|p| p.part_number);
        CompleteMultipartUpload { parts }
    }

    /// Apply a lifecycle event.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTransition`] and leaves the state unchanged if the
    /// event is not accepted.
    pub fn apply(&mut self, event: TransferEvent) -> Result<&TransferState, InvalidTransition> {
        let event_name = event.name();
        let next = self.state.transition(event)?;
        debug!(
            key = %self.key,
            from = self.state.name(),
            to = next.name(),
            event = event_name,
            "Transfer state changed"
        );
        self.state = next;
        Ok(&self.state)
    }

    /// Whether this checkpoint describes a payload of `total_size` bytes with
    /// a contiguous part layout.
    pub(crate) fn matches_payload(&self, total_size: u64) -> bool {
        let mut offset = 0;
        for (i, part) in self.parts.iter().enumerate() {
            if part.offset != offset || part.length == 0 || part.part_number as usize != i + 1 {
                return false;
            }
            offset += part.length;
        }
        offset == total_size && self.total_size == total_size
    }

    /// Prepare a checkpoint for a new transfer: back to `Idle`, keeping the
    /// upload ID and every recorded result.
    pub(crate) fn restart(&mut self) {
        self.state = TransferState::Idle;
    }
}
