//! Metric name and label definitions.

/// Inbound message intake and command dispatch.
pub mod dispatch {
    /// Messages handed to the intake pipeline
    pub const MESSAGES_RECEIVED_TOTAL: &str = "parley_dispatch_messages_received_total";
    /// Messages dropped before execution, labelled by stage
    pub const MESSAGES_DROPPED_TOTAL: &str = "parley_dispatch_messages_dropped_total";
    /// Intake stage faults, labelled by stage
    pub const STAGE_ERRORS_TOTAL: &str = "parley_dispatch_stage_errors_total";
    /// Command executions that reached the engine
    pub const COMMANDS_EXECUTED_TOTAL: &str = "parley_dispatch_commands_executed_total";
    /// Failed command results, labelled by failure kind
    pub const COMMAND_FAILURES_TOTAL: &str = "parley_dispatch_command_failures_total";
    /// Engine execution duration in seconds
    pub const EXECUTION_DURATION_SECONDS: &str = "parley_dispatch_execution_duration_seconds";
    /// Items waiting in the execution queue
    pub const QUEUE_DEPTH: &str = "parley_dispatch_queue_depth";
    /// Executions rejected because the queue was full or closed
    pub const QUEUE_REJECTIONS_TOTAL: &str = "parley_dispatch_queue_rejections_total";
    /// Execution contexts disposed
    pub const CONTEXTS_DISPOSED_TOTAL: &str = "parley_dispatch_contexts_disposed_total";
    /// Errors raised while disposing execution contexts
    pub const DISPOSAL_ERRORS_TOTAL: &str = "parley_dispatch_disposal_errors_total";
}

/// Common label keys.
pub mod labels {
    pub const STAGE: &str = "stage";
    pub const FAILURE_KIND: &str = "failure_kind";
    pub const SOURCE: &str = "source";
}
