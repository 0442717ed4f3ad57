use crate::runtime::sink::SinkError;

/// Outcome of a sink hook that can be interrupted by shutdown signals.
pub(crate) enum HookDecision {
    Finished(Result<(), SinkError>),
    Cancelled,
}
