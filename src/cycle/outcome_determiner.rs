//! Sub-step E of the Cycle Handler: classifies what happened during one
//! cycle into the flag set the Next-Step Scheduler decides from.

use crate::error::ExceptionKind;

/// Raw signals the rest of the cycle pipeline observed, handed to
/// [`determine`] for classification.
#[derive(Debug, Clone, Default)]
pub struct CycleSignals {
    /// Set if the provider stream ended in a terminal `error` event.
    pub stream_error: Option<(ExceptionKind, String)>,
    /// The stream ended without error and produced non-empty narrative text.
    pub produced_final_response: bool,
    /// At least one tool call in this cycle's batch executed without error.
    pub any_tool_succeeded: bool,
    /// A tool call was attempted at all (success or failure).
    pub any_tool_attempted: bool,
    /// A `<request_state>` tag was present and its transition applied, or a
    /// workflow fired and returned a `next_state`.
    pub state_change_applied: bool,
    /// A `<think>` block was present in the response.
    pub thought_produced: bool,
}

/// The classified result of one cycle, consumed by the Next-Step Scheduler.
#[derive(Debug, Clone, Default)]
pub struct Outcome {
    pub cycle_completed_successfully: bool,
    pub trigger_failover: bool,
    pub needs_reactivation: bool,
    pub executed_tool_successfully: bool,
    pub state_change_requested: bool,
    pub thought_produced: bool,
    pub action_taken: bool,
    /// `true` when the error is in the fixed retryable class and hasn't yet
    /// exhausted `max_retries_for_cycle`; the scheduler still checks the
    /// retry budget itself.
    pub retryable: bool,
    pub error_kind: Option<ExceptionKind>,
    pub error_message: Option<String>,
}

/// Classifies the signals gathered from one finished cycle into an `Outcome`.
pub fn determine(signals: CycleSignals) -> Outcome {
    let mut outcome = Outcome {
        thought_produced: signals.thought_produced,
        action_taken: signals.any_tool_attempted || signals.state_change_applied,
        ..Default::default()
    };

    if signals.any_tool_succeeded {
        outcome.executed_tool_successfully = true;
        outcome.needs_reactivation = true;
    }

    if signals.state_change_applied {
        outcome.state_change_requested = true;
        outcome.needs_reactivation = true;
    }

    if let Some((kind, message)) = signals.stream_error {
        outcome.error_kind = Some(kind);
        outcome.error_message = Some(message);

        if kind.is_provider_level() || kind.is_key_related() {
            outcome.trigger_failover = true;
        } else if kind.is_provider_internal_retry() {
            outcome.retryable = true;
        } else {
            // bad_request | api_status_4xx_other | unknown
            outcome.trigger_failover = true;
        }
    } else if signals.produced_final_response {
        outcome.cycle_completed_successfully = true;
    }

    outcome
}
