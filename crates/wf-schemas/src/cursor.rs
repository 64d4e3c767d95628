use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::{uuid, Uuid};

/// The reserved workflow id used for trigger types whose cursor must not fan
/// out per workflow (currently `user_created`; see §4.5).
pub const GLOBAL_CURSOR_ID: Uuid = uuid!("00000000-0000-0000-0000-000000000001");

/// A per-`(workflow, trigger_type)` watermark. Advanced to "now" once a batch
/// has been durably enqueued (never to a row's own timestamp — see §9).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TriggerCursor {
    pub workflow_id: Uuid,
    pub trigger_type: String,
    pub last_execution_time: chrono::DateTime<chrono::Utc>,
}
