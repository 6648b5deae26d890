// ABOUTME: Deployment lifecycle: records, the state machine, locking, dispatch, and the service.
// ABOUTME: Exports the orchestrator and the record types it hands out.

mod dispatcher;
mod error;
mod lock;
mod orchestrator;
mod record;
mod status;
mod transitions;

pub use dispatcher::{Dispatcher, DispatcherConfig};
pub use error::{DeployError, DeployErrorKind};
pub use lock::{DeployLock, DeployLocks, LOCK_WAIT, LockFile, LockInfo, guarded_triggers};
pub use orchestrator::{
    CreatedDeployment, ManualDeployment, Orchestrator, OrchestratorBuilder, TriggerOutcome,
};
pub use record::{
    ApprovalFields, DeploymentAction, DeploymentRecord, DeploymentSource, ExecutionFields,
    NewDeployment, PendingApproval, ROLLBACK_TRIGGER, RollbackTarget, TriggerKind,
    idempotency_key,
};
pub use status::{DeploymentStatus, Transition};
pub use transitions::{
    DEFAULT_REJECTION_REASON, TIMEOUT_EXIT_CODE, TransitionResult, UNSTARTED_EXIT_CODE,
};
