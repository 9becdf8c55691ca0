//! Chunk planning.
//!
//! Splits a payload of known size into contiguous [`PartDescriptor`]s after
//! validating the part size and object size against [`ProviderLimits`].
//! Payloads that fit in one part are planned as a single-shot `PUT` rather
//! than a multipart upload.

use serde::{Deserialize, Serialize};

use rustack_upload_auth::ProviderLimits;

use crate::error::InitError;

/// One contiguous byte range of the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartDescriptor {
    /// 1-based part number.
    pub part_number: u32,
    /// Offset of the first byte.
    pub offset: u64,
    /// Number of bytes.
    pub length: u64,
}

/// How the payload is transferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UploadMode {
    /// One `PUT` finalizes the object; no upload ID is allocated.
    SingleShot,
    /// Initiate, upload parts, complete.
    Multipart,
}

/// The output of [`plan`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartPlan {
    /// Transfer mode.
    pub mode: UploadMode,
    /// Parts in ascending part-number order.
    pub parts: Vec<PartDescriptor>,
}

/// Plan the parts of a `total_size`-byte payload.
///
/// # Errors
///
/// - [`InitError::MissingParams`] for an empty payload
/// - [`InitError::InvalidPartSize`] when `part_size` is outside the provider
///   range or would need more parts than the provider allows
/// - [`InitError::FileTooLarge`] when the payload exceeds the provider's
///   maximum object size
///
/// # Examples
///
/// ```
/// use rustack_upload_auth::Provider;
/// use rustack_upload_core::planner::{UploadMode, plan};
///
/// let mib = 1024 * 1024;
/// let plan = plan(15 * mib, 5 * mib, &Provider::Oss.limits()).unwrap();
/// assert_eq!(plan.mode, UploadMode::Multipart);
/// assert_eq!(plan.parts.len(), 3);
/// ```
pub fn plan(
    total_size: u64,
    part_size: u64,
    limits: &ProviderLimits,
) -> Result<PartPlan, InitError> {
    if total_size == 0 {
        return Err(InitError::MissingParams {
            message: "payload is empty".to_owned(),
        });
    }

    if part_size < limits.min_part_size || part_size > limits.max_part_size {
        return Err(InitError::InvalidPartSize {
            part_size,
            min: limits.min_part_size,
            max: limits.max_part_size,
        });
    }

    if total_size > limits.max_object_size {
        return Err(InitError::FileTooLarge {
            size: total_size,
            max: limits.max_object_size,
        });
    }

    if total_size <= part_size {
        return Ok(PartPlan {
            mode: UploadMode::SingleShot,
            parts: vec![PartDescriptor {
                part_number: 1,
                offset: 0,
                length: total_size,
            }],
        });
    }

    let count = total_size.div_ceil(part_size);
    if count > u64::from(limits.max_parts) {
        return Err(InitError::InvalidPartSize {
            part_size,
            min: total_size.div_ceil(u64::from(limits.max_parts)),
            max: limits.max_part_size,
        });
    }

    let mut parts = Vec::with_capacity(usize::try_from(count).unwrap_or_default());
    let mut offset = 0;
    let mut part_number = 1;
    while offset < total_size {
        let length = part_size.min(total_size - offset);
        parts.push(PartDescriptor {
            part_number,
            offset,
            length,
        });
        offset += length;
        part_number += 1;
    }

    Ok(PartPlan {
        mode: UploadMode::Multipart,
        parts,
    })
}
